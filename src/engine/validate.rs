use crate::engine::batch::Batch;
use crate::engine::offset;
use crate::engine::similarity::normalize_field;
use crate::engine::types::{
    Category, ClassifiedActivity, ImageHint, LinkHint, LinkKind, MessageId, ParsedClassification,
    SourceMessage, combined_score,
};
use crate::engine::util::clip;
use crate::error::{ClassifierError, ClassifierResult};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 5.0;
pub const SCORE_DEFAULT: f64 = 2.5;
pub const CONFIDENCE_DEFAULT: f64 = 0.5;
const MAX_TITLE_CHARS: usize = 200;

/// Why a single item was discarded without failing its batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedItem {
    pub message_id: Option<MessageId>,
    pub code: &'static str,
    pub reason: String,
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let header = after_fence[..body_start].trim();
    if !header.is_empty() && !header.eq_ignore_ascii_case("json") {
        // A fenced block of another language; keep looking after it.
        let rest = &after_fence[body_start..];
        let close = rest.find("```")?;
        return fenced_block(&rest[close + 3..]);
    }
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// First balanced `[...]` substring, skipping brackets inside strings.
fn balanced_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Locate the JSON array in a model reply: a fenced code block first,
/// then the first balanced `[...]`.
/// A fenced block is authoritative: an object inside it is returned as is
/// so it fails as "not an array" rather than yielding a nested list.
pub fn extract_json_array(text: &str) -> Option<&str> {
    match fenced_block(text) {
        Some(block) if block.starts_with('[') || block.starts_with('{') => Some(block),
        Some(block) => balanced_array(block),
        None => balanced_array(text),
    }
}

fn parse_json_tolerant(raw: &str) -> ClassifierResult<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(strict_err) => json5::from_str::<Value>(raw).map_err(|_| {
            ClassifierError::Parse(format!("extracted text is not valid json: {strict_err}"))
        }),
    }
}

fn coerce_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(text)
    }
}

fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn coerce_score(value: Option<&Value>) -> f64 {
    coerce_number(value)
        .map(|n| n.clamp(SCORE_MIN, SCORE_MAX))
        .unwrap_or(SCORE_DEFAULT)
}

fn coerce_confidence(value: Option<&Value>) -> f64 {
    coerce_number(value)
        .map(|n| n.clamp(0.0, 1.0))
        .unwrap_or(CONFIDENCE_DEFAULT)
}

fn coerce_bool(value: Option<&Value>, fallback: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => false,
        _ => fallback,
    }
}

fn coerce_integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn coerce_message_id(value: Option<&Value>) -> Option<MessageId> {
    coerce_integer(value).and_then(|n| u64::try_from(n).ok())
}

fn coerce_keywords(value: Option<&Value>) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| coerce_text(Some(v)))
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    let mut seen = BTreeSet::new();
    raw.into_iter()
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect()
}

fn coerce_link(value: Option<&Value>) -> Option<LinkHint> {
    let obj = value?.as_object()?;
    let kind = obj.get("type").and_then(Value::as_str).and_then(LinkKind::parse)?;
    let query = coerce_text(obj.get("q").or_else(|| obj.get("query")))?;
    Some(LinkHint { kind, query })
}

fn coerce_item(obj: &Map<String, Value>) -> Option<ParsedClassification> {
    let msg = coerce_message_id(obj.get("msg").or_else(|| obj.get("message_id")))?;
    Some(ParsedClassification {
        msg,
        off: match obj.get("off") {
            None => Some(0),
            present => coerce_integer(present),
        },
        title: coerce_text(obj.get("title").or_else(|| obj.get("activity"))).unwrap_or_default(),
        fun: coerce_score(obj.get("fun")),
        int: coerce_score(obj.get("int")),
        cat: obj
            .get("cat")
            .and_then(Value::as_str)
            .map(Category::parse_lenient)
            .unwrap_or(Category::Other),
        conf: coerce_confidence(obj.get("conf")),
        com: coerce_bool(obj.get("com"), false),
        act: coerce_text(obj.get("act")),
        act_orig: coerce_text(obj.get("act_orig")),
        obj: coerce_text(obj.get("obj")),
        obj_orig: coerce_text(obj.get("obj_orig")),
        venue: coerce_text(obj.get("venue")),
        city: coerce_text(obj.get("city")),
        region: coerce_text(obj.get("region")),
        country: coerce_text(obj.get("country")),
        kw: coerce_keywords(obj.get("kw")),
        img: coerce_text(obj.get("img")),
        stock: coerce_bool(obj.get("stock"), false),
        link: coerce_link(obj.get("link")),
    })
}

/// Parse a raw model reply into coerced classifications.
///
/// Structural problems (no array, invalid json, not an array) and a reply
/// that references none of `expected_ids` fail the whole batch. Elements
/// that are not objects or carry no usable message id are reported in the
/// returned drop list.
pub fn parse_response(
    raw_text: &str,
    expected_ids: &[MessageId],
) -> ClassifierResult<(Vec<ParsedClassification>, Vec<DroppedItem>)> {
    let extracted = extract_json_array(raw_text).ok_or_else(|| {
        ClassifierError::Parse(format!(
            "no json array found in response: {}",
            clip(raw_text, 200)
        ))
    })?;
    let value = parse_json_tolerant(extracted)?;
    let Value::Array(items) = value else {
        return Err(ClassifierError::Parse(
            "extracted json is not an array".to_string(),
        ));
    };

    let mut parsed = Vec::with_capacity(items.len());
    let mut dropped = Vec::new();
    for item in &items {
        let Some(obj) = item.as_object() else {
            dropped.push(DroppedItem {
                message_id: None,
                code: "NOT_AN_OBJECT",
                reason: "array element is not an object".to_string(),
            });
            continue;
        };
        match coerce_item(obj) {
            Some(p) => parsed.push(p),
            None => dropped.push(DroppedItem {
                message_id: None,
                code: "MISSING_MESSAGE_ID",
                reason: "element has no usable `msg` field".to_string(),
            }),
        }
    }

    if !expected_ids.is_empty() && !items.is_empty() {
        let expected: BTreeSet<MessageId> = expected_ids.iter().copied().collect();
        if !parsed.iter().any(|p| expected.contains(&p.msg)) {
            let seen: Vec<String> = parsed.iter().map(|p| p.msg.to_string()).collect();
            return Err(ClassifierError::Validation(format!(
                "response references none of the batch's message ids (expected {:?}, got [{}])",
                expected_ids,
                seen.join(", ")
            )));
        }
    }

    Ok((parsed, dropped))
}

fn place_query(p: &ParsedClassification) -> Option<String> {
    let venue = p.venue.as_deref()?;
    let parts: Vec<&str> = [Some(venue), p.city.as_deref(), p.country.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    Some(parts.join(", "))
}

fn media_key(p: &ParsedClassification) -> Option<String> {
    p.img
        .as_deref()
        .or(p.obj.as_deref())
        .or(p.act.as_deref())
        .map(normalize_field)
        .filter(|k| !k.is_empty())
}

fn to_activity(p: ParsedClassification, source: SourceMessage) -> ClassifiedActivity {
    let mut activity = ClassifiedActivity {
        activity_id: String::new(),
        activity: clip(&p.title, MAX_TITLE_CHARS),
        fun_score: p.fun,
        interesting_score: p.int,
        score: combined_score(p.fun, p.int),
        confidence: p.conf,
        category: p.cat,
        is_compound: p.com,
        image: ImageHint {
            media_key: media_key(&p),
            prefer_stock: p.stock,
        },
        place_query: place_query(&p),
        place_name: p.venue,
        action: p.act,
        action_original: p.act_orig,
        object: p.obj,
        object_original: p.obj_orig,
        city: p.city,
        region: p.region,
        country: p.country,
        keywords: p.kw,
        link: p.link,
        messages: vec![source],
    };
    activity.refresh_id();
    activity
}

/// Turn parsed items into activities, resolving each item's offset
/// against the batch candidate it names. Items with an empty title, an
/// unknown message id, or an unresolvable offset are dropped.
pub fn build_activities(
    batch: &Batch,
    parsed: Vec<ParsedClassification>,
) -> (Vec<ClassifiedActivity>, Vec<DroppedItem>) {
    let mut activities = Vec::with_capacity(parsed.len());
    let mut dropped = Vec::new();

    for item in parsed {
        if item.title.trim().is_empty() {
            dropped.push(DroppedItem {
                message_id: Some(item.msg),
                code: "EMPTY_TITLE",
                reason: "title is empty".to_string(),
            });
            continue;
        }
        let Some(candidate) = batch.candidate(item.msg) else {
            dropped.push(DroppedItem {
                message_id: Some(item.msg),
                code: "UNKNOWN_MESSAGE",
                reason: format!("message {} is not part of this batch", item.msg),
            });
            continue;
        };
        let Some(off) = item.off else {
            dropped.push(DroppedItem {
                message_id: Some(item.msg),
                code: "INVALID_OFFSET",
                reason: "offset is not an integer".to_string(),
            });
            continue;
        };
        match offset::resolve(candidate, off) {
            Ok(resolved) => activities.push(to_activity(item, resolved.into())),
            Err(err) => dropped.push(DroppedItem {
                message_id: Some(item.msg),
                code: "INVALID_OFFSET",
                reason: err.to_string(),
            }),
        }
    }

    (activities, dropped)
}

use crate::engine::types::{CandidateMessage, CandidateType, Category};
use crate::engine::util::single_line;
use sha2::{Digest, Sha256};

const SUGGESTION_INSTRUCTIONS: &str = "You are reading a group chat between friends. Each numbered item below is a message flagged as possibly suggesting something to do together: a place to visit, an activity to try, an event, a trip, a show to watch.

For every flagged message (marked >>>) that really is a suggestion for a future activity, emit one JSON object. Skip mundane chores, work tasks, things already done, and links shared without intent. Context lines are prefixed with their offset relative to the flagged message; set `off` to 0 unless the activity is only named in a context line, in which case use that line's offset.";

const AGREEMENT_INSTRUCTIONS: &str = "You are reading a group chat between friends. Each numbered item below is a message flagged as agreeing with or reacting enthusiastically to something (\"sounds great!\", \"yes let's do it\").

For every flagged message (marked >>>), find the earlier context line that actually names the activity being agreed to and emit one JSON object describing that activity. Set `off` to that line's offset (negative, e.g. -1 for the line just before). If no context line names a concrete activity, emit nothing for that message.";

const OUTPUT_SCHEMA: &str = "Respond with a JSON array only, inside a ```json fenced block. Each object has:
- msg: the flagged message id (number)
- off: offset of the line naming the activity (0 = flagged message)
- title: short activity title, under 100 chars
- fun: 0-5 how fun it sounds
- int: 0-5 how interesting or unusual it is
- cat: one of {categories}
- conf: 0-1 confidence this is a real suggestion
- com: true if the message bundles several distinct activities
- act / act_orig: normalised action verb and the original wording (or null)
- obj / obj_orig: normalised object and the original wording (or null)
- venue: named venue or business (or null)
- city, region, country: location parts if mentioned (or null)
- kw: array of search keywords
- img: short lowercase stock-photo key (or null)
- stock: true if a generic stock photo suits better than a venue photo
- link: {\"type\": website|movie|book|game|place|event, \"q\": search query} or null
Return [] if nothing qualifies.";

#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub home_country: Option<String>,
    pub timezone: Option<String>,
}

fn template_for(kind: CandidateType) -> &'static str {
    match kind {
        CandidateType::Suggestion => SUGGESTION_INSTRUCTIONS,
        CandidateType::Agreement => AGREEMENT_INSTRUCTIONS,
    }
}

fn category_list() -> String {
    Category::ALL
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_candidate(out: &mut String, position: usize, candidate: &CandidateMessage) {
    out.push_str(&format!(
        "---\nMESSAGE #{} (ID: {})\n",
        position + 1,
        candidate.message_id
    ));
    let before = candidate.context_before.len();
    for (i, ctx) in candidate.context_before.iter().enumerate() {
        let offset = i as i64 - before as i64;
        out.push_str(&format!(
            "[{offset}] {}: {}\n",
            ctx.sender,
            single_line(&ctx.content)
        ));
    }
    out.push_str(&format!(
        ">>> {}: {}\n",
        candidate.sender,
        single_line(&candidate.content)
    ));
    for (i, ctx) in candidate.context_after.iter().enumerate() {
        out.push_str(&format!(
            "[+{}] {}: {}\n",
            i + 1,
            ctx.sender,
            single_line(&ctx.content)
        ));
    }
}

/// Render one batch into the provider-ready prompt.
pub fn build_prompt(
    kind: CandidateType,
    candidates: &[CandidateMessage],
    ctx: &PromptContext,
) -> String {
    let mut out = String::new();
    out.push_str(template_for(kind));
    out.push_str("\n\n");
    if let Some(country) = ctx.home_country.as_deref() {
        out.push_str(&format!(
            "The chat participants live in {country}; assume local places are there unless stated otherwise.\n"
        ));
    }
    if let Some(tz) = ctx.timezone.as_deref() {
        out.push_str(&format!("Their timezone is {tz}.\n"));
    }
    for (position, candidate) in candidates.iter().enumerate() {
        render_candidate(&mut out, position, candidate);
    }
    out.push_str("---\n\n");
    out.push_str(&OUTPUT_SCHEMA.replace("{categories}", &category_list()));
    out
}

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Content hash of the prompt templates for a given template version.
/// Changes whenever any template text changes.
pub fn prompt_signature(template_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template_version.as_bytes());
    for part in [SUGGESTION_INSTRUCTIONS, AGREEMENT_INSTRUCTIONS, OUTPUT_SCHEMA] {
        hasher.update([0u8]);
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

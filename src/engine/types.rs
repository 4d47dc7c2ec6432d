use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type MessageId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMessage {
    pub id: MessageId,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    Suggestion,
    Agreement,
}

impl CandidateType {
    pub fn label(self) -> &'static str {
        match self {
            CandidateType::Suggestion => "suggestion",
            CandidateType::Agreement => "agreement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMessage {
    pub message_id: MessageId,
    pub content: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub candidate_type: CandidateType,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub context_before: Vec<ContextMessage>,
    #[serde(default)]
    pub context_after: Vec<ContextMessage>,
}

/// The concrete message a classification points at after offset resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMessage {
    pub id: MessageId,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMessage {
    pub id: MessageId,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl From<ResolvedMessage> for SourceMessage {
    fn from(resolved: ResolvedMessage) -> Self {
        Self {
            id: resolved.id,
            sender: resolved.sender,
            timestamp: resolved.timestamp,
            message: resolved.content,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Nightlife,
    Nature,
    Arts,
    Culture,
    Music,
    Entertainment,
    Events,
    Sports,
    Fitness,
    Wellness,
    Shopping,
    Travel,
    Experiences,
    Hobbies,
    Gaming,
    Learning,
    Family,
    Pets,
    Other,
}

impl Category {
    pub const ALL: [Category; 20] = [
        Category::Food,
        Category::Nightlife,
        Category::Nature,
        Category::Arts,
        Category::Culture,
        Category::Music,
        Category::Entertainment,
        Category::Events,
        Category::Sports,
        Category::Fitness,
        Category::Wellness,
        Category::Shopping,
        Category::Travel,
        Category::Experiences,
        Category::Hobbies,
        Category::Gaming,
        Category::Learning,
        Category::Family,
        Category::Pets,
        Category::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Nightlife => "nightlife",
            Category::Nature => "nature",
            Category::Arts => "arts",
            Category::Culture => "culture",
            Category::Music => "music",
            Category::Entertainment => "entertainment",
            Category::Events => "events",
            Category::Sports => "sports",
            Category::Fitness => "fitness",
            Category::Wellness => "wellness",
            Category::Shopping => "shopping",
            Category::Travel => "travel",
            Category::Experiences => "experiences",
            Category::Hobbies => "hobbies",
            Category::Gaming => "gaming",
            Category::Learning => "learning",
            Category::Family => "family",
            Category::Pets => "pets",
            Category::Other => "other",
        }
    }

    /// Unknown labels fall back to `Other`.
    pub fn parse_lenient(raw: &str) -> Category {
        let wanted = raw.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.label() == wanted)
            .unwrap_or(Category::Other)
    }
}

/// Raw provider output for one item, already coerced field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClassification {
    pub msg: MessageId,
    /// `None` when the reply carried an `off` that is not an integer.
    pub off: Option<i64>,
    pub title: String,
    pub fun: f64,
    pub int: f64,
    pub cat: Category,
    pub conf: f64,
    pub com: bool,
    pub act: Option<String>,
    pub act_orig: Option<String>,
    pub obj: Option<String>,
    pub obj_orig: Option<String>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub kw: Vec<String>,
    pub img: Option<String>,
    pub stock: bool,
    pub link: Option<LinkHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageHint {
    pub media_key: Option<String>,
    pub prefer_stock: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Website,
    Movie,
    Book,
    Game,
    Place,
    Event,
}

impl LinkKind {
    pub fn parse(raw: &str) -> Option<LinkKind> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "website" | "url" | "web" => Some(LinkKind::Website),
            "movie" | "film" | "tv" | "show" => Some(LinkKind::Movie),
            "book" => Some(LinkKind::Book),
            "game" | "boardgame" | "videogame" => Some(LinkKind::Game),
            "place" | "venue" => Some(LinkKind::Place),
            "event" => Some(LinkKind::Event),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkHint {
    pub kind: LinkKind,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedActivity {
    pub activity_id: String,
    pub activity: String,
    pub fun_score: f64,
    pub interesting_score: f64,
    pub score: f64,
    pub confidence: f64,
    pub category: Category,
    pub is_compound: bool,
    pub action: Option<String>,
    pub action_original: Option<String>,
    pub object: Option<String>,
    pub object_original: Option<String>,
    pub place_name: Option<String>,
    pub place_query: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub image: ImageHint,
    pub link: Option<LinkHint>,
    pub messages: Vec<SourceMessage>,
}

/// Canonical view hashed into `activity_id`: every field except the
/// evidence list and the id itself, in a fixed order.
#[derive(Serialize)]
struct ActivityIdentity<'a> {
    activity: &'a str,
    fun_score: f64,
    interesting_score: f64,
    score: f64,
    confidence: f64,
    category: Category,
    is_compound: bool,
    action: &'a Option<String>,
    action_original: &'a Option<String>,
    object: &'a Option<String>,
    object_original: &'a Option<String>,
    place_name: &'a Option<String>,
    place_query: &'a Option<String>,
    city: &'a Option<String>,
    region: &'a Option<String>,
    country: &'a Option<String>,
    keywords: &'a [String],
    image: &'a ImageHint,
    link: &'a Option<LinkHint>,
}

impl ClassifiedActivity {
    pub fn compute_id(&self) -> String {
        let identity = ActivityIdentity {
            activity: &self.activity,
            fun_score: self.fun_score,
            interesting_score: self.interesting_score,
            score: self.score,
            confidence: self.confidence,
            category: self.category,
            is_compound: self.is_compound,
            action: &self.action,
            action_original: &self.action_original,
            object: &self.object,
            object_original: &self.object_original,
            place_name: &self.place_name,
            place_query: &self.place_query,
            city: &self.city,
            region: &self.region,
            country: &self.country,
            keywords: &self.keywords,
            image: &self.image,
            link: &self.link,
        };
        // Struct fields serialize in declaration order, so the encoding is canonical.
        let canonical = serde_json::to_vec(&identity).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }

    pub fn refresh_id(&mut self) {
        self.activity_id = self.compute_id();
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Combined score, weighting interest twice as heavily as fun.
pub fn combined_score(fun_score: f64, interesting_score: f64) -> f64 {
    round_to((interesting_score * 2.0 + fun_score) / 3.0, 2)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

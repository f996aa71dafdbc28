//! Domain types shared across the workspace: session identity, journey
//! stages, languages, conversation log entries and the persisted records.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prefix of client-minted provisional session ids. Never persisted.
pub const PROVISIONAL_PREFIX: &str = "TEMP-";

/// A session identifier.
///
/// Two forms exist: a *provisional* form minted by the client before the
/// first turn (`TEMP-` prefix) and a *committed* form minted by the server
/// (`S-ABC-123`). Only committed ids ever reach the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a new committed session id.
    pub fn mint() -> Self {
        let mut rng = rand::thread_rng();
        let letters: String = (0..3)
            .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
            .collect();
        SessionId(format!("S-{}-{:03}", letters, rng.gen_range(0..1000u32)))
    }

    /// Wraps a raw string without validating its shape.
    pub fn from_raw(s: impl Into<String>) -> Self {
        SessionId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    /// Whether the id matches the committed format `S-` + three uppercase
    /// Latin letters + `-` + three decimal digits.
    pub fn is_committed(&self) -> bool {
        let b = self.0.as_bytes();
        b.len() == 9
            && b.starts_with(b"S-")
            && b[2..5].iter().all(u8::is_ascii_uppercase)
            && b[5] == b'-'
            && b[6..9].iter().all(u8::is_ascii_digit)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a conversation is in the sales arc.
///
/// Canonical labels are English; Polish and legacy uppercase aliases are
/// accepted at the edge and normalized before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JourneyStage {
    #[serde(alias = "Odkrywanie", alias = "DISCOVERY", alias = "discovery")]
    Discovery,
    #[serde(alias = "Analiza", alias = "ANALYSIS", alias = "analysis")]
    Analysis,
    #[serde(alias = "Decyzja", alias = "DECISION", alias = "decision")]
    Decision,
}

impl JourneyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyStage::Discovery => "Discovery",
            JourneyStage::Analysis => "Analysis",
            JourneyStage::Decision => "Decision",
        }
    }

    /// Parses a stage label in either accepted language, case-insensitively.
    pub fn parse_alias(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "discovery" | "odkrywanie" => Some(JourneyStage::Discovery),
            "analysis" | "analiza" => Some(JourneyStage::Analysis),
            "decision" | "decyzja" => Some(JourneyStage::Decision),
            _ => None,
        }
    }
}

impl Default for JourneyStage {
    fn default() -> Self {
        JourneyStage::Discovery
    }
}

impl std::fmt::Display for JourneyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared conversation language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "pl", alias = "PL")]
    Pl,
    #[serde(rename = "en", alias = "EN")]
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Pl => "pl",
            Language::En => "en",
        }
    }

    pub fn parse_alias(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pl" => Some(Language::Pl),
            "en" => Some(Language::En),
            _ => None,
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Pl
    }
}

/// Terminal outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(alias = "won", alias = "sale")]
    Won,
    #[serde(alias = "lost", alias = "no_sale")]
    Lost,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Won => "Won",
            Outcome::Lost => "Lost",
        }
    }

    pub fn parse_alias(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "won" | "sale" => Some(Outcome::Won),
            "lost" | "no_sale" => Some(Outcome::Lost),
            _ => None,
        }
    }
}

/// Author role of a conversation log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRole {
    /// The salesperson's free-form note about what the client said.
    Seller,
    /// The coached reply suggested by the fast model.
    FastReply,
    /// The remaining fast-model fields, encoded as one structured string.
    FastMeta,
}

impl LogRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogRole::Seller => "seller",
            LogRole::FastReply => "fast_reply",
            LogRole::FastMeta => "fast_meta",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seller" => Some(LogRole::Seller),
            "fast_reply" => Some(LogRole::FastReply),
            "fast_meta" => Some(LogRole::FastMeta),
            _ => None,
        }
    }
}

/// A persisted session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
    pub journey_stage: JourneyStage,
    pub language: Language,
}

impl SessionRecord {
    /// A fresh session with server defaults.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            ended_at: None,
            outcome: None,
            journey_stage: JourneyStage::default(),
            language: Language::default(),
        }
    }
}

/// One append-only conversation log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub session_id: SessionId,
    pub ts: DateTime<Utc>,
    pub role: LogRole,
    pub content: String,
    pub language: Language,
}

/// Terminal status of a Slow Path attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    Success,
    Error,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Success => "Success",
            AnalysisStatus::Error => "Error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Success" => Some(AnalysisStatus::Success),
            "Error" => Some(AnalysisStatus::Error),
            _ => None,
        }
    }
}

/// A persisted Slow Path attempt; latest-by-timestamp is current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub session_id: SessionId,
    pub ts: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub status: AnalysisStatus,
}

/// A knowledge snippet held in the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nugget {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub language: Language,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A nugget with its similarity score from a vector search.
#[derive(Debug, Clone)]
pub struct ScoredNugget {
    pub nugget: Nugget,
    pub score: f32,
}

/// Polarity of seller feedback on a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Up,
    Down,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Up => "up",
            Polarity::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Polarity::Up),
            "down" => Some(Polarity::Down),
            _ => None,
        }
    }
}

/// A stored piece of seller feedback on a prior suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub session_id: SessionId,
    pub entry_id: Option<i64>,
    pub polarity: Polarity,
    pub seller_note: String,
    pub suggestion: String,
    pub comment: String,
    pub language: Language,
    pub refined_suggestion: Option<String>,
    pub ts: DateTime<Utc>,
}

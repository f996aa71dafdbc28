//! The coached-reply document produced by the Fast Path, parsed permissively
//! from the fast model's JSON output.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::GatewayError;

/// Enumerated communication-style label for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientStyle {
    Analytical,
    Driver,
    Expressive,
    Amiable,
    #[default]
    Unknown,
}

impl ClientStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStyle::Analytical => "analytical",
            ClientStyle::Driver => "driver",
            ClientStyle::Expressive => "expressive",
            ClientStyle::Amiable => "amiable",
            ClientStyle::Unknown => "unknown",
        }
    }

    /// Unrecognized labels collapse to `Unknown` instead of failing the
    /// whole document.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "analytical" => ClientStyle::Analytical,
            "driver" => ClientStyle::Driver,
            "expressive" => ClientStyle::Expressive,
            "amiable" => ClientStyle::Amiable,
            _ => ClientStyle::Unknown,
        }
    }
}

impl Serialize for ClientStyle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClientStyle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ClientStyle::parse(&raw))
    }
}

/// Parsed Fast Path output: the coached reply plus follow-up strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastSuggestion {
    pub suggested_response: String,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
    #[serde(default)]
    pub optional_followup: Option<String>,
    /// Meta questions directed at the seller, about what the text cannot
    /// reveal (body language, tone).
    #[serde(default)]
    pub seller_questions: Vec<String>,
    #[serde(default)]
    pub client_style: ClientStyle,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub confidence_reason: String,
}

impl FastSuggestion {
    /// Validates and parses a fast-model document. Requires a non-empty
    /// suggested response; everything else defaults. Confidence is clamped
    /// into [0, 1].
    pub fn parse(document: &Value) -> Result<Self, GatewayError> {
        let mut parsed: FastSuggestion = serde_json::from_value(document.clone())
            .map_err(|e| GatewayError::Parse(format!("fast suggestion: {}", e)))?;
        if parsed.suggested_response.trim().is_empty() {
            return Err(GatewayError::Parse(
                "fast suggestion lacks a suggested_response".into(),
            ));
        }
        parsed.confidence_score = parsed.confidence_score.clamp(0.0, 1.0);
        Ok(parsed)
    }
}

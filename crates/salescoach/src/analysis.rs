//! The deep-analysis document produced by the Slow Path.
//!
//! Parsing is deliberately permissive: optional fields default, unknown
//! fields are preserved into the persisted payload, and validation rejects
//! only on missing required structure. This absorbs small schema drifts
//! between model variants without crashing the Slow Path.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::JourneyStage;
use crate::error::GatewayError;

/// Structured output of the Slow Path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepAnalysis {
    /// Overall confidence, 0–100.
    pub overall_confidence: f64,
    /// Recommended journey stage, accepted in either language.
    #[serde(default)]
    pub journey_stage: Option<String>,
    pub modules: AnalysisModules,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The fixed module set, each independently scored. Every module is
/// optional so a partially answered document still parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisModules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_summary: Option<ClientSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tactical_indicators: Option<TacticalIndicators>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psychometrics: Option<Psychometrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivation: Option<Motivation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictive_paths: Option<PredictivePaths>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<Playbook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_makers: Option<DecisionMakers>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSummary {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_facts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TacticalIndicators {
    #[serde(default)]
    pub confidence: f64,
    /// 0–100: how close the client is to buying.
    #[serde(default)]
    pub purchase_temperature: f64,
    /// 0–100: risk of losing the client.
    #[serde(default)]
    pub churn_risk: f64,
    #[serde(default)]
    pub objections: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Psychometrics {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub disc: DiscScores,
    #[serde(default)]
    pub big_five: BigFiveScores,
    #[serde(default)]
    pub schwartz_values: Vec<NamedScore>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscScores {
    #[serde(default)]
    pub dominance: f64,
    #[serde(default)]
    pub influence: f64,
    #[serde(default)]
    pub steadiness: f64,
    #[serde(default)]
    pub conscientiousness: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BigFiveScores {
    #[serde(default)]
    pub openness: f64,
    #[serde(default)]
    pub conscientiousness: f64,
    #[serde(default)]
    pub extraversion: f64,
    #[serde(default)]
    pub agreeableness: f64,
    #[serde(default)]
    pub neuroticism: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedScore {
    pub name: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Motivation {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub drivers: Vec<MotivationDriver>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MotivationDriver {
    pub name: String,
    #[serde(default)]
    pub strength: f64,
    /// Verbatim quotes from the conversation supporting the driver.
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictivePaths {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub paths: Vec<PredictedPath>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictedPath {
    pub scenario: String,
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub next_best_action: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Playbook {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub plays: Vec<Play>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Play {
    pub name: String,
    #[serde(default)]
    pub trigger: String,
    /// A ready-to-say sample line.
    #[serde(default)]
    pub line: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionMakers {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub actors: Vec<DecisionActor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionActor {
    pub role: String,
    #[serde(default)]
    pub influence: f64,
    #[serde(default)]
    pub stance: String,
}

impl DeepAnalysis {
    /// Validates and parses a model document. Rejects only on missing
    /// required structure (`overall_confidence` and a `modules` object);
    /// out-of-range confidences are clamped.
    pub fn parse(document: &Value) -> Result<Self, GatewayError> {
        if document.get("modules").map(|m| m.is_object()) != Some(true) {
            return Err(GatewayError::Parse(
                "analysis document lacks a modules object".into(),
            ));
        }
        if !document
            .get("overall_confidence")
            .map(Value::is_number)
            .unwrap_or(false)
        {
            return Err(GatewayError::Parse(
                "analysis document lacks overall_confidence".into(),
            ));
        }
        let mut parsed: DeepAnalysis = serde_json::from_value(document.clone())
            .map_err(|e| GatewayError::Parse(format!("analysis document: {}", e)))?;
        parsed.overall_confidence = parsed.overall_confidence.clamp(0.0, 100.0);
        Ok(parsed)
    }

    /// The recommended stage, normalized across language variants.
    pub fn recommended_stage(&self) -> Option<JourneyStage> {
        self.journey_stage
            .as_deref()
            .and_then(JourneyStage::parse_alias)
    }
}

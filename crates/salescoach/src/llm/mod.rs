//! LLM gateway: model abstraction, bounded retry and the fast/deep
//! fallback composition.

mod gateway;
mod ollama;
mod retry;

pub use gateway::{AnalyzeOutcome, GatewayConfig, LlmGateway};
pub use ollama::OllamaChat;
pub use retry::{call_with_retry, RetryPolicy};

use async_trait::async_trait;

use crate::error::GatewayError;

/// Sampling parameters for one model call.
#[derive(Debug, Clone, Copy)]
pub struct ChatParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One logical chat model. Implementations return the raw response text;
/// fence stripping and JSON parsing happen in the gateway so that any model
/// can substitute for any other on fallback.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn chat(&self, prompt: &str, params: &ChatParams) -> Result<String, GatewayError>;
}

/// Strips an optional markdown code fence (```json … ``` or ``` … ```)
/// around a model response.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

/// Validates and parses a raw model response into a JSON document.
pub fn parse_document(raw: &str) -> Result<serde_json::Value, GatewayError> {
    if raw.trim().is_empty() {
        return Err(GatewayError::EmptyResponse);
    }
    let body = strip_code_fences(raw);
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        GatewayError::Parse(format!("{} (body: {})", e, preview))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn rejects_empty_bodies() {
        assert!(matches!(
            parse_document("   "),
            Err(GatewayError::EmptyResponse)
        ));
    }

    #[test]
    fn parses_fenced_documents() {
        let doc = parse_document("```json\n{\"confidence\": 0.8}\n```").unwrap();
        assert_eq!(doc["confidence"], 0.8);
    }

    #[test]
    fn parse_failure_carries_preview() {
        let err = parse_document("not json").unwrap_err();
        match err {
            GatewayError::Parse(msg) => assert!(msg.contains("not json")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}

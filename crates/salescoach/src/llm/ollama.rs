//! Ollama-compatible chat client. One instance per logical model; both the
//! fast and the deep surface are backed by this client with different model
//! ids.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ChatModel, ChatParams};
use crate::error::GatewayError;

/// Client for an Ollama-compatible `/api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaChat {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
}

impl OllamaChat {
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model: model.into(),
        }
    }
}

/// Request payload for the chat endpoint.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    stream: bool,
    /// Constrains the model to emit a JSON object.
    format: &'a str,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response from the chat endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(&self, prompt: &str, params: &ChatParams) -> Result<String, GatewayError> {
        let url = self
            .base_url
            .join("api/chat")
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            format: "json",
            options: ChatOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(std::time::Duration::ZERO)
            } else {
                GatewayError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(&self.model, status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(format!("malformed chat envelope: {}", e)))?;

        let text = parsed
            .message
            .map(|m| m.content)
            .or(parsed.response)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Normalizes provider HTTP statuses into the gateway error taxonomy.
fn classify_status(model: &str, status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Auth(body),
        StatusCode::NOT_FOUND => GatewayError::ModelNotFound(model.to_string()),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited(body),
        s if s.is_server_error() => GatewayError::Provider(format!("{}: {}", s, body)),
        s => GatewayError::Http(format!("{}: {}", s, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let auth = classify_status("m", StatusCode::UNAUTHORIZED, "no".into());
        assert!(auth.is_auth());
        let missing = classify_status("m", StatusCode::NOT_FOUND, "".into());
        assert!(matches!(missing, GatewayError::ModelNotFound(_)));
        let limited = classify_status("m", StatusCode::TOO_MANY_REQUESTS, "".into());
        assert!(limited.is_rate_limited());
        let provider = classify_status("m", StatusCode::BAD_GATEWAY, "".into());
        assert!(provider.is_transient());
        let other = classify_status("m", StatusCode::BAD_REQUEST, "".into());
        assert!(matches!(other, GatewayError::Http(_)));
    }
}

//! Error types for the external-dependency layers.
//!
//! Each layer carries its own error enum; the HTTP edge maps them onto the
//! uniform response envelope. The gateway taxonomy distinguishes the classes
//! the orchestrator reacts to differently: timeouts and rate limits become
//! soft failures, auth faults additionally suppress the Slow Path spawn.

use std::time::Duration;

/// Errors from the LLM gateway surfaces.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The per-call or overall deadline elapsed.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    /// Connection-level failure (reset, refused, DNS).
    #[error("transport error: {0}")]
    Http(String),
    /// Credentials rejected by the provider.
    #[error("authentication rejected: {0}")]
    Auth(String),
    /// The configured model id is unknown to the provider.
    #[error("model not found: {0}")]
    ModelNotFound(String),
    /// The provider throttled the call.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Provider-side failure (5xx).
    #[error("provider error: {0}")]
    Provider(String),
    /// The provider answered with an empty body.
    #[error("empty response body")]
    EmptyResponse,
    /// The response body did not parse as the expected JSON document.
    #[error("response did not parse: {0}")]
    Parse(String),
    /// Both the deep model and the fast fallback failed.
    #[error("deep model failed ({deep}); fast fallback failed ({fast})")]
    BothFailed {
        deep: Box<GatewayError>,
        fast: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Transient classes are worth retrying: timeouts, connection resets
    /// and provider 5xx responses.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_) | GatewayError::Http(_) | GatewayError::Provider(_)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited(_))
    }
}

/// Errors from the retrieval dependencies (embedder and vector store).
///
/// The retrieval layer itself never surfaces these to callers; they degrade
/// to the sentinel context string and are logged.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("transport error: {0}")]
    Http(String),
    #[error("dependency answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed dependency response: {0}")]
    Codec(String),
}

impl From<reqwest::Error> for RetrievalError {
    fn from(err: reqwest::Error) -> Self {
        RetrievalError::Http(err.to_string())
    }
}

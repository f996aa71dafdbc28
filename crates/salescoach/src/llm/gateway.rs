use log::warn;
use std::sync::Arc;
use std::time::Duration;

use super::retry::{call_with_retry, RetryPolicy};
use super::{parse_document, ChatModel, ChatParams};
use crate::error::GatewayError;

/// Per-call ceilings and retry policy for the two gateway surfaces. The
/// orchestrator applies its own overall budgets on top; the tighter wins.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub fast_call_deadline: Duration,
    pub deep_call_deadline: Duration,
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            fast_call_deadline: Duration::from_secs(10),
            deep_call_deadline: Duration::from_secs(90),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of the combined `analyze` surface.
#[derive(Debug, Clone)]
pub struct AnalyzeOutcome {
    pub document: serde_json::Value,
    pub model_used: String,
    pub fallback_used: bool,
    pub fallback_reason: Option<String>,
}

/// Two-surface gateway over the external models: a low-latency fast model
/// and a high-latency deep model, either of which can substitute for the
/// other on fallback.
pub struct LlmGateway {
    fast: Arc<dyn ChatModel>,
    deep: Arc<dyn ChatModel>,
    config: GatewayConfig,
}

impl LlmGateway {
    pub fn new(fast: Arc<dyn ChatModel>, deep: Arc<dyn ChatModel>, config: GatewayConfig) -> Self {
        Self { fast, deep, config }
    }

    pub fn fast_model_id(&self) -> &str {
        self.fast.model_id()
    }

    pub fn deep_model_id(&self) -> &str {
        self.deep.model_id()
    }

    /// Calls the fast model under its per-call deadline.
    pub async fn fast(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<serde_json::Value, GatewayError> {
        self.call(
            &self.fast,
            self.config.fast_call_deadline,
            prompt,
            temperature,
            max_tokens,
        )
        .await
    }

    /// Calls the deep model under its per-call deadline.
    pub async fn deep(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<serde_json::Value, GatewayError> {
        self.call(
            &self.deep,
            self.config.deep_call_deadline,
            prompt,
            temperature,
            max_tokens,
        )
        .await
    }

    /// Combined surface: deep first, falling back to fast on any failure.
    /// Auth failures from the deep model also fall through (logged); when
    /// both fail the error carries both reasons.
    pub async fn analyze(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<AnalyzeOutcome, GatewayError> {
        match self.deep(prompt, temperature, max_tokens).await {
            Ok(document) => Ok(AnalyzeOutcome {
                document,
                model_used: self.deep.model_id().to_string(),
                fallback_used: false,
                fallback_reason: None,
            }),
            Err(deep_err) => {
                if deep_err.is_auth() {
                    warn!(
                        "deep model rejected credentials, falling back to {}: {}",
                        self.fast.model_id(),
                        deep_err
                    );
                } else {
                    warn!(
                        "deep model failed, falling back to {}: {}",
                        self.fast.model_id(),
                        deep_err
                    );
                }
                match self.fast(prompt, temperature, max_tokens).await {
                    Ok(document) => Ok(AnalyzeOutcome {
                        document,
                        model_used: self.fast.model_id().to_string(),
                        fallback_used: true,
                        fallback_reason: Some(deep_err.to_string()),
                    }),
                    Err(fast_err) => Err(GatewayError::BothFailed {
                        deep: Box::new(deep_err),
                        fast: Box::new(fast_err),
                    }),
                }
            }
        }
    }

    async fn call(
        &self,
        model: &Arc<dyn ChatModel>,
        deadline: Duration,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<serde_json::Value, GatewayError> {
        let params = ChatParams {
            temperature,
            max_tokens,
        };
        let attempt = call_with_retry(&self.config.retry, model.model_id(), || {
            model.chat(prompt, &params)
        });
        let raw = tokio::time::timeout(deadline, attempt)
            .await
            .map_err(|_| GatewayError::Timeout(deadline))??;
        parse_document(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubModel {
        id: &'static str,
        reply: Result<&'static str, fn() -> GatewayError>,
        calls: AtomicUsize,
    }

    impl StubModel {
        fn ok(id: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                reply: Ok(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: &'static str, err: fn() -> GatewayError) -> Arc<Self> {
            Arc::new(Self {
                id,
                reply: Err(err),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for StubModel {
        fn model_id(&self) -> &str {
            self.id
        }

        async fn chat(&self, _prompt: &str, _params: &ChatParams) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(make) => Err(make()),
            }
        }
    }

    fn quick_config() -> GatewayConfig {
        GatewayConfig {
            fast_call_deadline: Duration::from_millis(200),
            deep_call_deadline: Duration::from_millis(200),
            retry: RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
                multiplier: 2.0,
                max_backoff: Duration::from_millis(1),
            },
        }
    }

    #[tokio::test]
    async fn analyze_prefers_deep() {
        let fast = StubModel::ok("fast-model", r#"{"who":"fast"}"#);
        let deep = StubModel::ok("deep-model", r#"{"who":"deep"}"#);
        let gateway = LlmGateway::new(fast.clone(), deep.clone(), quick_config());
        let outcome = gateway.analyze("p", 0.4, 64).await.unwrap();
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.model_used, "deep-model");
        assert_eq!(outcome.document["who"], "deep");
        assert_eq!(fast.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn analyze_falls_back_on_deep_failure() {
        let fast = StubModel::ok("fast-model", r#"{"who":"fast"}"#);
        let deep = StubModel::failing("deep-model", || GatewayError::Provider("502".into()));
        let gateway = LlmGateway::new(fast, deep, quick_config());
        let outcome = gateway.analyze("p", 0.4, 64).await.unwrap();
        assert!(outcome.fallback_used);
        assert_eq!(outcome.model_used, "fast-model");
        assert!(outcome.fallback_reason.unwrap().contains("502"));
    }

    #[tokio::test]
    async fn analyze_falls_back_on_auth_failure_too() {
        let fast = StubModel::ok("fast-model", r#"{"who":"fast"}"#);
        let deep = StubModel::failing("deep-model", || GatewayError::Auth("bad key".into()));
        let gateway = LlmGateway::new(fast, deep, quick_config());
        let outcome = gateway.analyze("p", 0.4, 64).await.unwrap();
        assert!(outcome.fallback_used);
    }

    #[tokio::test]
    async fn analyze_reports_both_failures() {
        let fast = StubModel::failing("fast-model", || GatewayError::Http("reset".into()));
        let deep = StubModel::failing("deep-model", || GatewayError::Provider("503".into()));
        let gateway = LlmGateway::new(fast, deep, quick_config());
        let err = gateway.analyze("p", 0.4, 64).await.unwrap_err();
        match err {
            GatewayError::BothFailed { deep, fast } => {
                assert!(deep.to_string().contains("503"));
                assert!(fast.to_string().contains("reset"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn call_enforces_deadline() {
        struct SlowModel;
        #[async_trait]
        impl ChatModel for SlowModel {
            fn model_id(&self) -> &str {
                "slow"
            }
            async fn chat(&self, _: &str, _: &ChatParams) -> Result<String, GatewayError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("{}".into())
            }
        }
        let gateway = LlmGateway::new(Arc::new(SlowModel), Arc::new(SlowModel), quick_config());
        let err = gateway.fast("p", 0.2, 64).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
    }
}

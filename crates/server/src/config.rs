//! Environment-driven configuration with optional overrides for the tunable
//! thresholds and deadlines.

use std::time::Duration;

use salescoach::llm::{GatewayConfig, RetryPolicy};
use salescoach::retrieval::RetrievalConfig;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    /// Assembled from `DATABASE_URL` or the `DATABASE_*` parts. Absent means
    /// the server runs degraded without persistence.
    pub database_url: Option<String>,
    pub vector_url: Option<Url>,
    pub vector_collection: String,
    pub llm_url: Option<Url>,
    pub llm_api_key: Option<String>,
    pub fast_model: String,
    pub deep_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub admin_secret: Option<String>,
    /// Origins allowed to open the push channel. Empty means any.
    pub allowed_origins: Vec<String>,
    pub retrieval: RetrievalConfig,
    /// Orchestrator budget for embed + search on the Fast Path.
    pub retrieval_budget: Duration,
    /// Overall Fast Path model budget.
    pub fast_deadline: Duration,
    /// Overall Slow Path analysis budget.
    pub slow_deadline: Duration,
    /// Width of the process-wide Slow Path semaphore.
    pub slow_width: usize,
    /// Pause before the Slow Path engages the model.
    pub slow_start_delay: Duration,
    /// How long the Slow Path probes for a live channel before proceeding.
    pub channel_probe_window: Duration,
    pub channel_probe_interval: Duration,
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            vector_url: None,
            vector_collection: "sales_knowledge".to_string(),
            llm_url: None,
            llm_api_key: None,
            fast_model: "llama3.1:8b".to_string(),
            deep_model: "deepseek-r1:70b".to_string(),
            embedding_model: "all-minilm".to_string(),
            embedding_dimension: 384,
            admin_secret: None,
            allowed_origins: Vec::new(),
            retrieval: RetrievalConfig::default(),
            retrieval_budget: Duration::from_millis(1500),
            fast_deadline: Duration::from_secs(5),
            slow_deadline: Duration::from_secs(90),
            slow_width: 5,
            slow_start_delay: Duration::from_secs(1),
            channel_probe_window: Duration::from_secs(10),
            channel_probe_interval: Duration::from_millis(500),
            gateway: GatewayConfig {
                fast_call_deadline: Duration::from_secs(10),
                deep_call_deadline: Duration::from_secs(90),
                retry: RetryPolicy::default(),
            },
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env(name).and_then(|v| v.parse().ok())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();

        config.database_url = env("DATABASE_URL").or_else(assemble_database_url);
        config.vector_url = env("VECTOR_URL").and_then(|v| Url::parse(&v).ok());
        if let Some(collection) = env("VECTOR_COLLECTION") {
            config.vector_collection = collection;
        }
        config.llm_url = env("LLM_URL").and_then(|v| Url::parse(&v).ok());
        config.llm_api_key = env("LLM_API_KEY");
        if let Some(model) = env("FAST_MODEL") {
            config.fast_model = model;
        }
        if let Some(model) = env("DEEP_MODEL") {
            config.deep_model = model;
        }
        if let Some(model) = env("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dim) = env_parse("EMBEDDING_DIMENSION") {
            config.embedding_dimension = dim;
        }
        config.admin_secret = env("ADMIN_SECRET");
        if let Some(origins) = env("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(threshold) = env_parse("SIMILARITY_THRESHOLD") {
            config.retrieval.score_threshold = threshold;
        }
        if let Some(k) = env_parse("RETRIEVAL_K") {
            config.retrieval.top_k = k;
        }
        if let Some(cap) = env_parse("CONTEXT_CAP") {
            config.retrieval.context_cap = cap;
        }
        if let Some(deadline) = env_millis("FAST_DEADLINE_MS") {
            config.fast_deadline = deadline;
        }
        if let Some(deadline) = env_millis("SLOW_DEADLINE_MS") {
            config.slow_deadline = deadline;
            config.gateway.deep_call_deadline = deadline;
        }
        if let Some(width) = env_parse("SLOW_PATH_WIDTH") {
            config.slow_width = width;
        }
        if let Some(delay) = env_millis("SLOW_START_DELAY_MS") {
            config.slow_start_delay = delay.min(Duration::from_secs(5));
        }

        config
    }
}

/// Builds a Postgres URL from the split `DATABASE_*` variables; `None` when
/// the host is not configured.
fn assemble_database_url() -> Option<String> {
    let host = env("DATABASE_HOST")?;
    let port = env("DATABASE_PORT").unwrap_or_else(|| "5432".to_string());
    let user = env("DATABASE_USER").unwrap_or_else(|| "postgres".to_string());
    let password = env("DATABASE_PASSWORD").unwrap_or_default();
    let name = env("DATABASE_NAME").unwrap_or_else(|| "salescoach".to_string());
    if password.is_empty() {
        Some(format!("postgres://{}@{}:{}/{}", user, host, port, name))
    } else {
        Some(format!(
            "postgres://{}:{}@{}:{}/{}",
            user, password, host, port, name
        ))
    }
}

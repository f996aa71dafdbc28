//! Application context: every dependency behind an explicit, optionally
//! absent handle, constructed once at startup and passed to every handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use salescoach::enrichment::{EnrichmentToggles, MarketData};
use salescoach::llm::{LlmGateway, OllamaChat};
use salescoach::retrieval::{HttpEmbedder, QdrantStore, RetrievalEngine};
use salescoach::session::{PgSessionStore, SessionManager, SessionStore};

use crate::channels::ChannelRegistry;
use crate::config::Config;

pub struct AppContext {
    pub config: Config,
    pub sessions: SessionManager,
    pub retrieval: Option<Arc<RetrievalEngine>>,
    pub gateway: Option<Arc<LlmGateway>>,
    pub channels: ChannelRegistry,
    /// Process-wide gate on concurrently executing Slow Path tasks.
    pub slow_gate: Arc<Semaphore>,
    pub market: MarketData,
    pub toggles: EnrichmentToggles,
}

pub type SharedContext = Arc<AppContext>;

impl AppContext {
    /// Wires every dependency from configuration. Each one degrades to
    /// absent with a warning instead of failing startup; the orchestrator
    /// checks availability before use.
    pub async fn initialize(config: Config) -> anyhow::Result<SharedContext> {
        let store: Option<Arc<dyn SessionStore>> = match &config.database_url {
            Some(url) => match PgSessionStore::connect(url).await {
                Ok(store) => {
                    info!("session store connected");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!(error = %e, "session store unavailable, running non-persistent");
                    None
                }
            },
            None => {
                warn!("no database configured, running non-persistent");
                None
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        let retrieval = match (&config.vector_url, &config.llm_url) {
            (Some(vector_url), Some(llm_url)) => {
                let embedder = HttpEmbedder::new(
                    client.clone(),
                    llm_url.clone(),
                    config.embedding_model.clone(),
                    config.embedding_dimension,
                );
                let store = QdrantStore::new(
                    client.clone(),
                    vector_url.clone(),
                    config.vector_collection.clone(),
                );
                if let Err(e) = store.ensure_collection(config.embedding_dimension).await {
                    warn!(error = %e, "vector collection check failed, retrieval may degrade");
                }
                Some(Arc::new(RetrievalEngine::new(
                    Arc::new(embedder),
                    Arc::new(store),
                    config.retrieval.clone(),
                )))
            }
            _ => {
                warn!("vector store or embedder endpoint missing, retrieval disabled");
                None
            }
        };

        let gateway = match &config.llm_url {
            Some(llm_url) => {
                let fast = OllamaChat::new(
                    client.clone(),
                    llm_url.clone(),
                    config.llm_api_key.clone(),
                    config.fast_model.clone(),
                );
                let deep = OllamaChat::new(
                    client,
                    llm_url.clone(),
                    config.llm_api_key.clone(),
                    config.deep_model.clone(),
                );
                info!(fast = %config.fast_model, deep = %config.deep_model, "llm gateway ready");
                Some(Arc::new(LlmGateway::new(
                    Arc::new(fast),
                    Arc::new(deep),
                    config.gateway.clone(),
                )))
            }
            None => {
                warn!("no llm endpoint configured, coaching disabled");
                None
            }
        };

        let slow_gate = Arc::new(Semaphore::new(config.slow_width));

        Ok(Arc::new(AppContext {
            sessions: SessionManager::new(store),
            retrieval,
            gateway,
            channels: ChannelRegistry::new(),
            slow_gate,
            market: MarketData::default(),
            toggles: EnrichmentToggles::default(),
            config,
        }))
    }
}

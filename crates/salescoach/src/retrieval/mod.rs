//! Retrieval layer: embed the query, search the vector store, assemble a
//! bounded context string for prompt grounding.

mod embedding;
mod vector;

pub use embedding::{Embedder, HttpEmbedder};
pub use vector::{QdrantStore, VectorStore};

use log::warn;
use std::sync::Arc;

use crate::domain::{Language, Nugget, ScoredNugget};
use crate::error::RetrievalError;

/// Fixed sentinel returned when no grounded context is available. The fast
/// model is still called; it proceeds on general principles.
pub const NO_CONTEXT: &str =
    "No grounded knowledge available for this note; rely on general sales principles.";

/// Delimiter between concatenated nugget bodies.
const DELIMITER: &str = "\n---\n";

/// Tunables for context assembly.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Minimum similarity for a hit to survive.
    pub score_threshold: f32,
    /// How many bodies are concatenated.
    pub top_k: usize,
    /// Byte cap on the assembled context.
    pub context_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.50,
            top_k: 3,
            context_cap: 2000,
        }
    }
}

/// Embed-then-search context provider. Pure over (query, language); never
/// raises, every failure degrades to the sentinel.
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Builds the grounding context for a seller note. Always returns a
    /// non-empty string (possibly [`NO_CONTEXT`]).
    pub async fn context(&self, query: &str, language: Language) -> String {
        match self.hits(query, language).await {
            Ok(hits) if !hits.is_empty() => assemble_context(&hits, &self.config),
            Ok(_) => NO_CONTEXT.to_string(),
            Err(e) => {
                warn!("retrieval degraded to sentinel: {}", e);
                NO_CONTEXT.to_string()
            }
        }
    }

    async fn hits(
        &self,
        query: &str,
        language: Language,
    ) -> Result<Vec<ScoredNugget>, RetrievalError> {
        let vector = self.embedder.embed(query).await?;
        let mut hits = self
            .store
            .search(
                &vector,
                language,
                self.config.top_k,
                self.config.score_threshold,
            )
            .await?;
        // The store already thresholds; filter again in case a backend
        // ignores the parameter.
        hits.retain(|h| h.score >= self.config.score_threshold);
        hits.truncate(self.config.top_k);
        Ok(hits)
    }

    /// Embeds and upserts a nugget (admin surface).
    pub async fn index(&self, nugget: &Nugget) -> Result<(), RetrievalError> {
        let text = format!("{}\n{}", nugget.title, nugget.body);
        let vector = self.embedder.embed(&text).await?;
        self.store.upsert(nugget, &vector).await
    }

    pub async fn remove(&self, id: &str) -> Result<(), RetrievalError> {
        self.store.delete(id).await
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<Nugget>, RetrievalError> {
        self.store.list(limit).await
    }
}

/// Concatenates the top bodies, delimiter-separated, truncated to the byte
/// cap on a char boundary.
fn assemble_context(hits: &[ScoredNugget], config: &RetrievalConfig) -> String {
    let joined = hits
        .iter()
        .take(config.top_k)
        .map(|h| h.nugget.body.as_str())
        .collect::<Vec<_>>()
        .join(DELIMITER);

    if joined.len() <= config.context_cap {
        return joined;
    }
    let mut cut = config.context_cap;
    while cut > 0 && !joined.is_char_boundary(cut) {
        cut -= 1;
    }
    joined[..cut].to_string()
}

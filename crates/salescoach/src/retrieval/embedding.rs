use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RetrievalError;

/// Deterministic text-to-vector function. Model state is shared, read-only
/// and thread-safe behind the implementation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output dimensionality, fixed per model.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// HTTP embedder for an Ollama-compatible `/api/embed` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: Url,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            base_url,
            model: model.into(),
            dimension,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let url = self
            .base_url
            .join("api/embed")
            .map_err(|e| RetrievalError::Http(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: vec![text],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Codec(e.to_string()))?;

        let vector = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Codec("embedder returned no vectors".into()))?;
        if vector.len() != self.dimension {
            return Err(RetrievalError::Codec(format!(
                "embedder returned dimension {}, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(vector)
    }
}

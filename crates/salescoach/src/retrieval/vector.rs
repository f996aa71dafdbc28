use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::domain::{Language, Nugget, ScoredNugget};
use crate::error::RetrievalError;

/// Similarity index over knowledge nuggets, filterable by language.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest neighbours above `score_threshold`, best first.
    async fn search(
        &self,
        vector: &[f32],
        language: Language,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredNugget>, RetrievalError>;

    async fn upsert(&self, nugget: &Nugget, vector: &[f32]) -> Result<(), RetrievalError>;

    async fn delete(&self, id: &str) -> Result<(), RetrievalError>;

    async fn list(&self, limit: usize) -> Result<Vec<Nugget>, RetrievalError>;
}

/// HTTP client for a Qdrant-compatible points API.
#[derive(Debug, Clone)]
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: Url,
    collection: String,
}

impl QdrantStore {
    pub fn new(client: reqwest::Client, base_url: Url, collection: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            collection: collection.into(),
        }
    }

    /// Creates the collection when it does not exist yet (cosine distance).
    pub async fn ensure_collection(&self, dimension: usize) -> Result<(), RetrievalError> {
        let url = self.collection_url("")?;
        let exists = self.client.get(url.clone()).send().await?;
        if exists.status().is_success() {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        });
        let response = self.client.put(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn collection_url(&self, suffix: &str) -> Result<Url, RetrievalError> {
        self.base_url
            .join(&format!("collections/{}{}", self.collection, suffix))
            .map_err(|e| RetrievalError::Http(e.to_string()))
    }

    async fn check(&self, response: reqwest::Response) -> Result<Value, RetrievalError> {
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| RetrievalError::Codec(e.to_string()))
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    score_threshold: f32,
    with_payload: bool,
    filter: Value,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<NuggetPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NuggetPayload {
    title: String,
    body: String,
    #[serde(default)]
    keywords: Vec<String>,
    language: Language,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl NuggetPayload {
    fn into_nugget(self, id: String) -> Nugget {
        Nugget {
            id,
            title: self.title,
            body: self.body,
            keywords: self.keywords,
            language: self.language,
            kind: self.kind,
            tags: self.tags,
        }
    }
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn search(
        &self,
        vector: &[f32],
        language: Language,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredNugget>, RetrievalError> {
        let url = self.collection_url("/points/search")?;
        let request = SearchRequest {
            vector,
            limit,
            score_threshold,
            with_payload: true,
            filter: serde_json::json!({
                "must": [{ "key": "language", "match": { "value": language.as_str() } }]
            }),
        };
        let raw = self
            .check(self.client.post(url).json(&request).send().await?)
            .await?;
        let parsed: SearchResponse =
            serde_json::from_value(raw).map_err(|e| RetrievalError::Codec(e.to_string()))?;

        Ok(parsed
            .result
            .into_iter()
            .filter_map(|hit| {
                let id = id_string(&hit.id);
                hit.payload.map(|p| ScoredNugget {
                    nugget: p.into_nugget(id),
                    score: hit.score,
                })
            })
            .collect())
    }

    async fn upsert(&self, nugget: &Nugget, vector: &[f32]) -> Result<(), RetrievalError> {
        let url = self.collection_url("/points")?;
        let payload = NuggetPayload {
            title: nugget.title.clone(),
            body: nugget.body.clone(),
            keywords: nugget.keywords.clone(),
            language: nugget.language,
            kind: nugget.kind.clone(),
            tags: nugget.tags.clone(),
        };
        let body = serde_json::json!({
            "points": [{
                "id": &nugget.id,
                "vector": vector,
                "payload": payload,
            }]
        });
        self.check(self.client.put(url).json(&body).send().await?)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RetrievalError> {
        let url = self.collection_url("/points/delete")?;
        let body = serde_json::json!({ "points": [id] });
        self.check(self.client.post(url).json(&body).send().await?)
            .await?;
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<Nugget>, RetrievalError> {
        let url = self.collection_url("/points/scroll")?;
        let body = serde_json::json!({ "limit": limit, "with_payload": true });
        let raw = self
            .check(self.client.post(url).json(&body).send().await?)
            .await?;

        #[derive(Deserialize)]
        struct ScrollResponse {
            result: ScrollResult,
        }
        #[derive(Deserialize)]
        struct ScrollResult {
            points: Vec<SearchHit>,
        }

        let parsed: ScrollResponse =
            serde_json::from_value(raw).map_err(|e| RetrievalError::Codec(e.to_string()))?;
        Ok(parsed
            .result
            .points
            .into_iter()
            .filter_map(|hit| {
                let id = id_string(&hit.id);
                hit.payload.map(|p| p.into_nugget(id))
            })
            .collect())
    }
}

//! Administrative knowledge surface: a thin, shared-secret-guarded layer
//! over the embedder and vector store.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use salescoach::domain::{Language, Nugget};

use super::{error_response, fail_response, success};
use crate::context::SharedContext;

const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

fn authorize(ctx: &SharedContext, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &ctx.config.admin_secret else {
        return Err(fail_response(
            StatusCode::UNAUTHORIZED,
            "admin surface is not configured",
        ));
    };
    let presented = headers
        .get(ADMIN_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        warn!("admin request with missing or wrong secret");
        return Err(fail_response(StatusCode::UNAUTHORIZED, "invalid admin secret"));
    }
    Ok(())
}

fn retrieval(ctx: &SharedContext) -> Result<&std::sync::Arc<salescoach::RetrievalEngine>, Response> {
    ctx.retrieval.as_ref().ok_or_else(|| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "knowledge store is not configured",
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct AddNuggetRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub language: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub async fn add_nugget(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Json(req): Json<AddNuggetRequest>,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }
    let engine = match retrieval(&ctx) {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    if req.title.trim().is_empty() || req.body.trim().is_empty() {
        return fail_response(StatusCode::BAD_REQUEST, "title and body are required");
    }
    let Some(language) = Language::parse_alias(&req.language) else {
        return fail_response(
            StatusCode::BAD_REQUEST,
            format!("unsupported language: {}", req.language),
        );
    };

    let nugget = Nugget {
        id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        title: req.title,
        body: req.body,
        keywords: req.keywords,
        language,
        kind: req.kind,
        tags: req.tags,
    };
    match engine.index(&nugget).await {
        Ok(()) => success(json!({ "id": nugget.id })).into_response(),
        Err(e) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("indexing failed: {}", e),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    100
}

pub async fn list_nuggets(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }
    let engine = match retrieval(&ctx) {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    match engine.list(query.limit).await {
        Ok(nuggets) => success(json!({ "nuggets": nuggets })).into_response(),
        Err(e) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("listing failed: {}", e),
        ),
    }
}

pub async fn delete_nugget(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = authorize(&ctx, &headers) {
        return response;
    }
    let engine = match retrieval(&ctx) {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    match engine.remove(&id).await {
        Ok(()) => success(json!({ "deleted": id })).into_response(),
        Err(e) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("deletion failed: {}", e),
        ),
    }
}

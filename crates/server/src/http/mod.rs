//! HTTP edge: the uniform response envelope, error mapping and the router.

pub mod admin;
pub mod sessions;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use salescoach::session::StoreError;

use crate::context::SharedContext;
use crate::ws;

/// The uniform `{status, data?, message?}` wrapper.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        status: "success",
        data: Some(data),
        message: None,
    })
}

/// Client-side fault: HTTP 4xx with `status: "fail"`.
pub fn fail_response(status: StatusCode, message: impl Into<String>) -> Response {
    envelope_response(status, "fail", message)
}

/// Server-side fault: HTTP 5xx with `status: "error"`.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    envelope_response(status, "error", message)
}

fn envelope_response(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Response {
    let body = Json(Envelope::<()> {
        status: kind,
        data: None,
        message: Some(message.into()),
    });
    (status, body).into_response()
}

/// Maps store errors onto the propagation policy: invalid ids are 400,
/// unknown sessions 404, a dead store 503.
pub fn store_error_response(e: StoreError) -> Response {
    match e {
        StoreError::InvalidSessionId(id) => fail_response(
            StatusCode::BAD_REQUEST,
            format!("provisional session id not allowed here: {}", id),
        ),
        StoreError::NotFound(id) => {
            fail_response(StatusCode::NOT_FOUND, format!("unknown session: {}", id))
        }
        StoreError::AlreadyExists(id) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("session id collision: {}", id),
        ),
        StoreError::Db(msg) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, format!("store unavailable: {}", msg))
        }
        StoreError::Codec(msg) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("codec fault: {}", msg))
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn router(ctx: SharedContext) -> Router {
    let admin = Router::new()
        .route("/knowledge", post(admin::add_nugget).get(admin::list_nuggets))
        .route("/knowledge/{id}", delete(admin::delete_nugget));

    let cors = cors_layer(&ctx.config.allowed_origins);

    Router::new()
        .route("/api/v1/sessions/new", post(sessions::create))
        .route("/api/v1/sessions/send", post(sessions::send))
        .route("/api/v1/sessions/refine", post(sessions::refine))
        .route("/api/v1/sessions/retry_slowpath", post(sessions::retry_slowpath))
        .route("/api/v1/sessions/end", post(sessions::end))
        .route("/api/v1/sessions/feedback", post(sessions::feedback))
        .route("/api/v1/sessions/{id}", get(sessions::fetch))
        .route("/api/v1/ws/sessions/{id}", get(ws::ws_handler))
        .nest("/api/v1/admin", admin)
        .layer(cors)
        .with_state(ctx)
}

//! WebSocket push transport: one channel per committed session.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use salescoach::domain::SessionId;

use crate::channels::{ChannelHandle, PushMessage};
use crate::context::SharedContext;
use crate::http::fail_response;

const CHANNEL_DEPTH: usize = 16;

/// An empty allowlist admits any origin; otherwise the `Origin` header must
/// match one of the configured values. Non-browser clients without the
/// header are admitted.
fn origin_allowed(allowed: &[String], headers: &axum::http::HeaderMap) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match headers.get("origin").and_then(|v| v.to_str().ok()) {
        Some(origin) => allowed.iter().any(|a| a == origin),
        None => true,
    }
}

/// Upgrade handler for `/api/v1/ws/sessions/{id}`.
///
/// Identity rules: provisional ids are rejected outright; when the store is
/// available the session's existence is verified, but a store error accepts
/// the connection (graceful degradation).
pub async fn ws_handler(
    Path(id): Path<String>,
    State(ctx): State<SharedContext>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !origin_allowed(&ctx.config.allowed_origins, &headers) {
        return fail_response(StatusCode::FORBIDDEN, "origin not allowed");
    }
    let session_id = SessionId::from_raw(id);
    if session_id.is_provisional() {
        return fail_response(
            StatusCode::BAD_REQUEST,
            "provisional session ids cannot open a push channel",
        );
    }
    if !session_id.is_committed() {
        return fail_response(StatusCode::BAD_REQUEST, "malformed session id");
    }

    if ctx.sessions.store_available() {
        match ctx.sessions.get(&session_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return fail_response(StatusCode::NOT_FOUND, "unknown session");
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "channel identity check degraded, accepting");
            }
        }
    }

    ws.on_upgrade(move |socket| pump(socket, ctx, session_id))
        .into_response()
}

/// Bridges the registry's mpsc queue onto the socket. The queue gives the
/// per-session single-writer guarantee; this task is the only socket writer.
async fn pump(socket: WebSocket, ctx: SharedContext, session_id: SessionId) {
    let (tx, mut rx) = mpsc::channel::<PushMessage>(CHANNEL_DEPTH);
    let handle = ChannelHandle::new(tx);
    let conn_id = handle.conn_id;
    if let Err(e) = ctx.channels.attach(&session_id, handle).await {
        warn!(session = %session_id, error = %e, "channel attach refused");
        return;
    }
    info!(session = %session_id, %conn_id, "push channel attached");

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "push message did not serialize");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain incoming frames only to notice the disconnect.
    let recv_task = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    // Remove only our own registration; a newer connection for the same
    // session stays attached.
    ctx.channels.detach(&session_id, conn_id).await;
    info!(session = %session_id, %conn_id, "push channel detached");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn headers_with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("origin", origin.parse().unwrap());
        headers
    }

    #[test]
    fn empty_allowlist_admits_all() {
        assert!(origin_allowed(&[], &headers_with_origin("https://evil.example")));
        assert!(origin_allowed(&[], &HeaderMap::new()));
    }

    #[test]
    fn allowlist_is_enforced_for_browser_origins() {
        let allowed = vec!["https://app.example".to_string()];
        assert!(origin_allowed(&allowed, &headers_with_origin("https://app.example")));
        assert!(!origin_allowed(&allowed, &headers_with_origin("https://evil.example")));
        // Non-browser clients send no Origin header.
        assert!(origin_allowed(&allowed, &HeaderMap::new()));
    }
}

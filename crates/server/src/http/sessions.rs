//! Session-facing route handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use salescoach::domain::{JourneyStage, Language, Outcome, Polarity, SessionId};
use salescoach::domain::FeedbackRecord;

use super::{fail_response, store_error_response, success};
use crate::context::SharedContext;
use crate::orchestrator::{self, RefineInput, TurnInput};

/// Hard cap on a seller note; exactly this many characters is accepted.
pub const MAX_USER_INPUT_CHARS: usize = 5000;

pub fn validate_user_input(input: &str) -> Result<(), String> {
    if input.trim().is_empty() {
        return Err("user_input must not be empty".into());
    }
    let chars = input.chars().count();
    if chars > MAX_USER_INPUT_CHARS {
        return Err(format!(
            "user_input is {} characters, limit is {}",
            chars, MAX_USER_INPUT_CHARS
        ));
    }
    Ok(())
}

fn parse_session_id(raw: &str) -> Result<SessionId, String> {
    let id = SessionId::from_raw(raw);
    if id.is_provisional() || id.is_committed() {
        Ok(id)
    } else {
        Err(format!("malformed session id: {}", raw))
    }
}

pub async fn create(State(ctx): State<SharedContext>) -> Response {
    match ctx.sessions.create().await {
        Ok(record) => success(json!({
            "session_id": record.id,
            "journey_stage": record.journey_stage,
            "language": record.language,
        }))
        .into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub session_id: String,
    pub user_input: String,
    pub journey_stage: String,
    pub language: String,
}

pub async fn send(State(ctx): State<SharedContext>, Json(req): Json<SendRequest>) -> Response {
    if let Err(msg) = validate_user_input(&req.user_input) {
        return fail_response(StatusCode::BAD_REQUEST, msg);
    }
    let session_id = match parse_session_id(&req.session_id) {
        Ok(id) => id,
        Err(msg) => return fail_response(StatusCode::BAD_REQUEST, msg),
    };
    let Some(journey_stage) = JourneyStage::parse_alias(&req.journey_stage) else {
        return fail_response(
            StatusCode::BAD_REQUEST,
            format!("unknown journey stage: {}", req.journey_stage),
        );
    };
    let Some(language) = Language::parse_alias(&req.language) else {
        return fail_response(
            StatusCode::BAD_REQUEST,
            format!("unsupported language: {}", req.language),
        );
    };

    let reply = orchestrator::handle_turn(
        &ctx,
        TurnInput {
            session_id,
            user_input: req.user_input,
            journey_stage,
            language,
        },
    )
    .await;
    success(reply).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    pub session_id: String,
    pub original_input: String,
    pub bad_suggestion: String,
    pub feedback: String,
    pub language: String,
}

pub async fn refine(State(ctx): State<SharedContext>, Json(req): Json<RefineRequest>) -> Response {
    let session_id = match parse_session_id(&req.session_id) {
        Ok(id) => id,
        Err(msg) => return fail_response(StatusCode::BAD_REQUEST, msg),
    };
    let Some(language) = Language::parse_alias(&req.language) else {
        return fail_response(
            StatusCode::BAD_REQUEST,
            format!("unsupported language: {}", req.language),
        );
    };
    let reply = orchestrator::handle_refine(
        &ctx,
        RefineInput {
            session_id,
            original_input: req.original_input,
            bad_suggestion: req.bad_suggestion,
            criticism: req.feedback,
            language,
        },
    )
    .await;
    success(reply).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RetrySlowPathRequest {
    pub session_id: String,
    #[serde(default)]
    pub language: Option<String>,
}

pub async fn retry_slowpath(
    State(ctx): State<SharedContext>,
    Json(req): Json<RetrySlowPathRequest>,
) -> Response {
    let session_id = SessionId::from_raw(&req.session_id);
    if !session_id.is_committed() {
        return fail_response(
            StatusCode::BAD_REQUEST,
            "retry requires a committed session id",
        );
    }
    let language = req
        .language
        .as_deref()
        .and_then(Language::parse_alias)
        .unwrap_or_default();
    crate::orchestrator::slow_path::spawn(ctx.clone(), session_id.clone(), language);
    success(json!({ "session_id": session_id, "scheduled": true })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct EndRequest {
    pub session_id: String,
    pub outcome: String,
}

pub async fn end(State(ctx): State<SharedContext>, Json(req): Json<EndRequest>) -> Response {
    let session_id = SessionId::from_raw(&req.session_id);
    let Some(outcome) = Outcome::parse_alias(&req.outcome) else {
        return fail_response(
            StatusCode::BAD_REQUEST,
            format!("unknown outcome: {}", req.outcome),
        );
    };
    match ctx.sessions.end(&session_id, outcome).await {
        Ok(()) => success(json!({ "session_id": session_id, "outcome": outcome })).into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub session_id: String,
    #[serde(default)]
    pub entry_id: Option<i64>,
    pub polarity: String,
    #[serde(default)]
    pub seller_note: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub language: Option<String>,
}

pub async fn feedback(
    State(ctx): State<SharedContext>,
    Json(req): Json<FeedbackRequest>,
) -> Response {
    let session_id = SessionId::from_raw(&req.session_id);
    if !session_id.is_committed() {
        return fail_response(
            StatusCode::BAD_REQUEST,
            "feedback requires a committed session id",
        );
    }
    let Some(polarity) = Polarity::parse(&req.polarity) else {
        return fail_response(
            StatusCode::BAD_REQUEST,
            format!("unknown polarity: {}", req.polarity),
        );
    };
    let record = FeedbackRecord {
        session_id,
        entry_id: req.entry_id,
        polarity,
        seller_note: req.seller_note,
        suggestion: req.suggestion,
        comment: req.comment,
        language: req
            .language
            .as_deref()
            .and_then(Language::parse_alias)
            .unwrap_or_default(),
        refined_suggestion: None,
        ts: chrono::Utc::now(),
    };
    match ctx.sessions.add_feedback(&record).await {
        Ok(()) => success(json!({ "stored": true })).into_response(),
        Err(e) => store_error_response(e),
    }
}

pub async fn fetch(State(ctx): State<SharedContext>, Path(id): Path<String>) -> Response {
    let session_id = SessionId::from_raw(&id);
    if session_id.is_provisional() {
        return fail_response(
            StatusCode::BAD_REQUEST,
            "provisional session ids are never persisted",
        );
    }
    match ctx.sessions.fetch(&session_id).await {
        Ok(view) => success(json!({
            "session": view.session,
            "log": view.entries,
            "latest_analysis": view.latest_analysis,
        }))
        .into_response(),
        Err(e) => store_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_cap_is_inclusive() {
        let at_cap = "x".repeat(MAX_USER_INPUT_CHARS);
        assert!(validate_user_input(&at_cap).is_ok());
        let over_cap = "x".repeat(MAX_USER_INPUT_CHARS + 1);
        assert!(validate_user_input(&over_cap).is_err());
        assert!(validate_user_input("   ").is_err());
    }

    #[test]
    fn input_cap_counts_characters_not_bytes() {
        // Multibyte characters at exactly the cap are accepted.
        let at_cap = "ż".repeat(MAX_USER_INPUT_CHARS);
        assert!(at_cap.len() > MAX_USER_INPUT_CHARS);
        assert!(validate_user_input(&at_cap).is_ok());
    }

    #[test]
    fn session_id_shapes() {
        assert!(parse_session_id("S-ABC-123").is_ok());
        assert!(parse_session_id("TEMP-local-7").is_ok());
        assert!(parse_session_id("final-test-session").is_err());
    }
}

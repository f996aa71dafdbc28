//! The dual-path request orchestrator.
//!
//! The Fast Path composes retrieval with the fast model under a hard
//! deadline and never surfaces a dependency error to the seller: every
//! failure becomes a localized soft-failure response. The Slow Path
//! (`slow_path`) is spawned detached and outlives the response.

pub mod prompt;
pub mod slow_path;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use salescoach::coaching::{ClientStyle, FastSuggestion};
use salescoach::domain::{FeedbackRecord, JourneyStage, Language, LogRole, Polarity, SessionId};
use salescoach::retrieval::NO_CONTEXT;
use salescoach::session::{History, HISTORY_TURNS};

use crate::context::SharedContext;
use prompt::HistoryLine;

const FAST_TEMPERATURE: f32 = 0.4;
const FAST_MAX_TOKENS: u32 = 1024;
const REFINE_MAX_TOKENS: u32 = 512;

/// A validated seller turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub session_id: SessionId,
    pub user_input: String,
    pub journey_stage: JourneyStage,
    pub language: Language,
}

/// The Fast Path response, soft failures included.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub session_id: SessionId,
    pub journey_stage: JourneyStage,
    pub suggested_response: String,
    pub suggested_questions: Vec<String>,
    pub optional_followup: Option<String>,
    pub seller_questions: Vec<String>,
    pub client_style: ClientStyle,
    pub confidence_score: f64,
    pub confidence_reason: String,
}

/// Why a turn degraded to a soft failure.
#[derive(Debug, Clone, Copy)]
enum SoftFailure {
    /// Deadline miss, parse failure or plain unavailability.
    Unavailable,
    RateLimited,
    /// Credentials misconfigured; the Slow Path is not spawned.
    Auth,
}

impl SoftFailure {
    fn message(&self, language: Language) -> &'static str {
        match (self, language) {
            (SoftFailure::Unavailable, Language::Pl) => {
                "Asystent potrzebuje chwili przerwy. Kontynuuj rozmowę z klientem, \
                 a za moment spróbuj ponownie."
            }
            (SoftFailure::Unavailable, Language::En) => {
                "The assistant needs a moment. Keep the conversation going and \
                 try again shortly."
            }
            (SoftFailure::RateLimited, Language::Pl) => {
                "Limit zapytań do modelu jest chwilowo wyczerpany. Odczekaj chwilę \
                 i spróbuj ponownie."
            }
            (SoftFailure::RateLimited, Language::En) => {
                "The model is temporarily rate limited. Wait a moment and try again."
            }
            (SoftFailure::Auth, Language::Pl) => {
                "Błąd konfiguracji dostępu do modelu. Skontaktuj się z administratorem."
            }
            (SoftFailure::Auth, Language::En) => {
                "Model access is misconfigured. Contact your administrator."
            }
        }
    }

    fn reason(&self, language: Language) -> &'static str {
        match (self, language) {
            (SoftFailure::Unavailable, Language::Pl) => "model nie odpowiedział w budżecie czasu",
            (SoftFailure::Unavailable, Language::En) => "the model did not answer within budget",
            (SoftFailure::RateLimited, Language::Pl) => "model chwilowo ograniczył ruch",
            (SoftFailure::RateLimited, Language::En) => "the model throttled the request",
            (SoftFailure::Auth, Language::Pl) => "odrzucone dane dostępowe modelu",
            (SoftFailure::Auth, Language::En) => "model credentials were rejected",
        }
    }
}

fn soft_reply(session_id: SessionId, input: &TurnInput, kind: SoftFailure) -> TurnReply {
    TurnReply {
        session_id,
        journey_stage: input.journey_stage,
        suggested_response: kind.message(input.language).to_string(),
        suggested_questions: Vec::new(),
        optional_followup: None,
        seller_questions: Vec::new(),
        client_style: ClientStyle::Unknown,
        confidence_score: 0.0,
        confidence_reason: kind.reason(input.language).to_string(),
    }
}

/// Handles one seller turn: the Fast Path, then a detached Slow Path spawn.
/// Never fails; dependency trouble degrades to a soft-failure reply.
pub async fn handle_turn(ctx: &SharedContext, input: TurnInput) -> TurnReply {
    // 1. Session commit: normalize to a committed id the client can adopt.
    let session_id = ctx.sessions.ensure_committed(&input.session_id).await;

    // 2. Persist the seller note; failure is tolerated.
    if let Err(e) = ctx
        .sessions
        .append(
            &session_id,
            LogRole::Seller,
            input.user_input.clone(),
            input.language,
        )
        .await
    {
        warn!(session = %session_id, error = %e, "seller note not persisted");
    }

    // 3. Assemble history, falling back to just the current note.
    let (summary, history) = match ctx.sessions.history(&session_id, HISTORY_TURNS).await {
        Ok(History {
            summary, entries, ..
        }) => (
            summary,
            entries
                .into_iter()
                .map(|e| (e.role, e.content))
                .collect::<Vec<HistoryLine>>(),
        ),
        Err(e) => {
            warn!(session = %session_id, error = %e, "history unavailable, using current note only");
            (
                None,
                vec![(LogRole::Seller, input.user_input.clone())],
            )
        }
    };

    // 4. Retrieve grounding context within the retrieval budget.
    let context = match &ctx.retrieval {
        Some(engine) => tokio::time::timeout(
            ctx.config.retrieval_budget,
            engine.context(&input.user_input, input.language),
        )
        .await
        .unwrap_or_else(|_| {
            warn!(session = %session_id, "retrieval exceeded budget, using sentinel");
            NO_CONTEXT.to_string()
        }),
        None => NO_CONTEXT.to_string(),
    };

    // 5. Call the fast model under the overall Fast Path budget.
    let Some(gateway) = &ctx.gateway else {
        warn!(session = %session_id, "no llm gateway, returning soft failure");
        return soft_reply(session_id, &input, SoftFailure::Unavailable);
    };
    let fast_prompt = prompt::compose_fast(
        summary.as_deref(),
        &history,
        &context,
        input.journey_stage,
        input.language,
        &input.user_input,
    );
    let outcome = tokio::time::timeout(
        ctx.config.fast_deadline,
        gateway.fast(&fast_prompt, FAST_TEMPERATURE, FAST_MAX_TOKENS),
    )
    .await;

    // 6. Parse and classify.
    let suggestion = match outcome {
        Err(_) => {
            info!(session = %session_id, "fast path deadline elapsed");
            slow_path::spawn(ctx.clone(), session_id.clone(), input.language);
            return soft_reply(session_id, &input, SoftFailure::Unavailable);
        }
        Ok(Err(e)) if e.is_rate_limited() => {
            info!(session = %session_id, "fast model rate limited");
            slow_path::spawn(ctx.clone(), session_id.clone(), input.language);
            return soft_reply(session_id, &input, SoftFailure::RateLimited);
        }
        Ok(Err(e)) if e.is_auth() => {
            warn!(session = %session_id, error = %e, "fast model rejected credentials");
            return soft_reply(session_id, &input, SoftFailure::Auth);
        }
        Ok(Err(e)) => {
            warn!(session = %session_id, error = %e, "fast model failed");
            slow_path::spawn(ctx.clone(), session_id.clone(), input.language);
            return soft_reply(session_id, &input, SoftFailure::Unavailable);
        }
        Ok(Ok(document)) => match FastSuggestion::parse(&document) {
            Ok(suggestion) => suggestion,
            Err(e) => {
                // Parse failure on an otherwise successful response is
                // treated as a deadline miss.
                warn!(session = %session_id, error = %e, "fast suggestion did not validate");
                slow_path::spawn(ctx.clone(), session_id.clone(), input.language);
                return soft_reply(session_id, &input, SoftFailure::Unavailable);
            }
        },
    };

    // 7. Persist the AI turn; failures tolerated. The seller note above was
    //    persisted first, keeping per-session append order.
    if let Err(e) = ctx
        .sessions
        .append(
            &session_id,
            LogRole::FastReply,
            suggestion.suggested_response.clone(),
            input.language,
        )
        .await
    {
        warn!(session = %session_id, error = %e, "fast reply not persisted");
    }
    let meta = serde_json::json!({
        "suggested_questions": &suggestion.suggested_questions,
        "optional_followup": &suggestion.optional_followup,
        "seller_questions": &suggestion.seller_questions,
        "client_style": suggestion.client_style,
        "confidence_score": suggestion.confidence_score,
        "confidence_reason": &suggestion.confidence_reason,
    });
    if let Err(e) = ctx
        .sessions
        .append(&session_id, LogRole::FastMeta, meta.to_string(), input.language)
        .await
    {
        warn!(session = %session_id, error = %e, "fast meta not persisted");
    }

    // 8. Detached Slow Path; the response never waits for it.
    slow_path::spawn(ctx.clone(), session_id.clone(), input.language);

    // 9. Respond.
    TurnReply {
        session_id,
        journey_stage: input.journey_stage,
        suggested_response: suggestion.suggested_response,
        suggested_questions: suggestion.suggested_questions,
        optional_followup: suggestion.optional_followup,
        seller_questions: suggestion.seller_questions,
        client_style: suggestion.client_style,
        confidence_score: suggestion.confidence_score,
        confidence_reason: suggestion.confidence_reason,
    }
}

/// A refinement turn: the seller disliked a suggestion.
#[derive(Debug, Clone)]
pub struct RefineInput {
    pub session_id: SessionId,
    pub original_input: String,
    pub bad_suggestion: String,
    pub criticism: String,
    pub language: Language,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefineReply {
    pub refined_suggestion: String,
}

/// Calls the fast model with a corrective prompt and records the feedback.
/// Failure modes mirror the Fast Path, minus the Slow Path trigger.
pub async fn handle_refine(ctx: &SharedContext, input: RefineInput) -> RefineReply {
    let Some(gateway) = &ctx.gateway else {
        return RefineReply {
            refined_suggestion: SoftFailure::Unavailable.message(input.language).to_string(),
        };
    };

    let corrective = prompt::compose_refine(
        &input.original_input,
        &input.bad_suggestion,
        &input.criticism,
        input.language,
    );
    let outcome = tokio::time::timeout(
        ctx.config.fast_deadline,
        gateway.fast(&corrective, FAST_TEMPERATURE, REFINE_MAX_TOKENS),
    )
    .await;

    let refined = match outcome {
        Err(_) => {
            return RefineReply {
                refined_suggestion: SoftFailure::Unavailable.message(input.language).to_string(),
            }
        }
        Ok(Err(e)) if e.is_rate_limited() => {
            return RefineReply {
                refined_suggestion: SoftFailure::RateLimited.message(input.language).to_string(),
            }
        }
        Ok(Err(e)) if e.is_auth() => {
            warn!(error = %e, "refinement model rejected credentials");
            return RefineReply {
                refined_suggestion: SoftFailure::Auth.message(input.language).to_string(),
            };
        }
        Ok(Err(e)) => {
            warn!(error = %e, "refinement call failed");
            return RefineReply {
                refined_suggestion: SoftFailure::Unavailable.message(input.language).to_string(),
            };
        }
        Ok(Ok(document)) => match parse_refinement(&document) {
            Some(text) => text,
            None => {
                warn!("refinement document lacked refined_suggestion");
                return RefineReply {
                    refined_suggestion: SoftFailure::Unavailable
                        .message(input.language)
                        .to_string(),
                };
            }
        },
    };

    // Record the down-vote with the refinement; a missing store degrades
    // the same way `send` does.
    let feedback = FeedbackRecord {
        session_id: input.session_id.clone(),
        entry_id: None,
        polarity: Polarity::Down,
        seller_note: input.original_input,
        suggestion: input.bad_suggestion,
        comment: input.criticism,
        language: input.language,
        refined_suggestion: Some(refined.clone()),
        ts: Utc::now(),
    };
    if let Err(e) = ctx.sessions.add_feedback(&feedback).await {
        warn!(session = %input.session_id, error = %e, "refinement feedback not persisted");
    }

    RefineReply {
        refined_suggestion: refined,
    }
}

fn parse_refinement(document: &serde_json::Value) -> Option<String> {
    document
        .get("refined_suggestion")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

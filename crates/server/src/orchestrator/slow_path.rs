//! The Slow Path: a detached, semaphore-gated deep analysis of the whole
//! conversation, persisted and pushed to the originating session's channel.
//!
//! Nothing in here may propagate out of the task: every failure is recorded
//! as an `Error` analysis entry and/or logged, and the worker survives.

use serde_json::Value;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use salescoach::analysis::DeepAnalysis;
use salescoach::domain::{AnalysisStatus, Language, LogRole, SessionId};
use salescoach::enrichment;
use salescoach::retrieval::NO_CONTEXT;
use salescoach::session::NewAnalysis;

use super::prompt::{self, HistoryLine};
use crate::channels::{PushMessage, SendOutcome};
use crate::context::SharedContext;

const DEEP_TEMPERATURE: f32 = 0.6;
const DEEP_MAX_TOKENS: u32 = 4096;

/// Spawns a detached analysis task. The caller never awaits it; a panic or
/// error inside the task cannot reach the worker.
pub fn spawn(ctx: SharedContext, session_id: SessionId, language: Language) {
    tokio::spawn(async move {
        run(ctx, session_id, language).await;
    });
}

async fn run(ctx: SharedContext, session_id: SessionId, language: Language) {
    // Bounded concurrency, wait-based admission. Saturation is logged but
    // the analysis is never dropped.
    let permit = match ctx.slow_gate.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            info!(session = %session_id, "slow path saturated, waiting for a slot");
            match ctx.slow_gate.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            }
        }
    };
    let _permit = permit;

    // Brief startup delay, then probe for a live channel so a client that
    // connects right after the Fast Path response still gets the push.
    tokio::time::sleep(ctx.config.slow_start_delay).await;
    let probe_deadline = Instant::now() + ctx.config.channel_probe_window;
    while !ctx.channels.has_channel(&session_id).await && Instant::now() < probe_deadline {
        tokio::time::sleep(ctx.config.channel_probe_interval).await;
    }

    // 1. Full, untruncated history. Fatal to this task when unavailable.
    let entries = match ctx.sessions.full_history(&session_id).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(session = %session_id, error = %e, "slow path history fetch failed");
            record_failure(&ctx, &session_id, language, "history unavailable").await;
            return;
        }
    };
    let history: Vec<HistoryLine> = entries
        .iter()
        .map(|e| (e.role, e.content.clone()))
        .collect();
    let latest_note = entries
        .iter()
        .rev()
        .find(|e| e.role == LogRole::Seller)
        .map(|e| e.content.clone())
        .unwrap_or_default();

    // 2. Grounding context for the latest note.
    let context = match &ctx.retrieval {
        Some(engine) => engine.context(&latest_note, language).await,
        None => NO_CONTEXT.to_string(),
    };

    // 3. Strategic enrichment from injected market data; pure functions,
    //    missing blocks are simply omitted.
    let strategic = enrichment::strategic_context(&ctx.market, &ctx.toggles, language);

    // 4. Combined deep-then-fast analyze call under the overall deadline.
    let Some(gateway) = &ctx.gateway else {
        record_failure(&ctx, &session_id, language, "no llm gateway configured").await;
        return;
    };
    let deep_prompt = prompt::compose_slow(&history, &context, strategic.as_deref(), language);
    let outcome = match timeout(
        ctx.config.slow_deadline,
        gateway.analyze(&deep_prompt, DEEP_TEMPERATURE, DEEP_MAX_TOKENS),
    )
    .await
    {
        Err(_) => {
            warn!(session = %session_id, "slow path deadline elapsed");
            record_failure(&ctx, &session_id, language, "analysis deadline elapsed").await;
            return;
        }
        Ok(Err(e)) => {
            warn!(session = %session_id, error = %e, "deep analysis failed on both models");
            record_failure(&ctx, &session_id, language, "analysis models unavailable").await;
            return;
        }
        Ok(Ok(outcome)) => outcome,
    };

    // 5. Validate the document; parse failure is a model failure.
    let analysis = match DeepAnalysis::parse(&outcome.document) {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!(session = %session_id, error = %e, "analysis document did not validate");
            record_failure(&ctx, &session_id, language, "analysis did not validate").await;
            return;
        }
    };

    // The persisted and pushed payload is the document plus the fallback
    // telemetry the client renders.
    let mut payload = outcome.document.clone();
    if let Value::Object(map) = &mut payload {
        map.insert("model_used".into(), Value::String(outcome.model_used));
        map.insert("fallback_used".into(), Value::Bool(outcome.fallback_used));
        map.insert(
            "fallback_reason".into(),
            outcome
                .fallback_reason
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
    }

    // 6. Persist first so a delivered push always has a Success entry with
    //    a non-later timestamp. A write failure downgrades to push-only.
    if let Err(e) = ctx
        .sessions
        .record_analysis(NewAnalysis {
            session_id: session_id.clone(),
            payload: payload.clone(),
            status: AnalysisStatus::Success,
        })
        .await
    {
        warn!(session = %session_id, error = %e, "analysis not persisted, pushing anyway");
    }

    // 7. Stage update when the recommendation differs, normalized across
    //    language variants.
    if let Some(recommended) = analysis.recommended_stage() {
        match ctx.sessions.get(&session_id).await {
            Ok(Some(record)) if record.journey_stage != recommended => {
                if let Err(e) = ctx.sessions.set_stage(&session_id, recommended).await {
                    warn!(session = %session_id, error = %e, "stage update failed");
                } else {
                    info!(session = %session_id, stage = %recommended, "journey stage updated");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(session = %session_id, error = %e, "stage check failed"),
        }
    }

    // 8. Push; failure is logged only.
    match ctx
        .channels
        .send(&session_id, PushMessage::SlowPathComplete { data: payload })
        .await
    {
        SendOutcome::Delivered => info!(session = %session_id, "deep analysis delivered"),
        SendOutcome::NoChannel => info!(session = %session_id, "no channel attached, analysis persisted only"),
        SendOutcome::Failed => warn!(session = %session_id, "push delivery failed"),
    }
}

/// Records an `Error` analysis entry and pushes a localized error
/// notification. Both steps are best-effort.
async fn record_failure(ctx: &SharedContext, session_id: &SessionId, language: Language, reason: &str) {
    let payload = serde_json::json!({ "error": reason });
    if let Err(e) = ctx
        .sessions
        .record_analysis(NewAnalysis {
            session_id: session_id.clone(),
            payload,
            status: AnalysisStatus::Error,
        })
        .await
    {
        warn!(session = %session_id, error = %e, "error analysis entry not persisted");
    }

    let message = match language {
        Language::Pl => "Pogłębiona analiza nie powiodła się. Spróbuj ponownie później.",
        Language::En => "The deep analysis failed. Try again later.",
    };
    let outcome = ctx
        .channels
        .send(
            session_id,
            PushMessage::SlowPathError {
                message: message.to_string(),
            },
        )
        .await;
    if outcome == SendOutcome::Failed {
        warn!(session = %session_id, "error notification push failed");
    }
}

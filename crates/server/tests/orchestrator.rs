//! End-to-end orchestrator tests over the in-memory store and stub models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use salescoach::coaching::ClientStyle;
use salescoach::domain::{AnalysisStatus, JourneyStage, Language, LogRole, SessionId};
use salescoach::enrichment::{EnrichmentToggles, MarketData};
use salescoach::error::GatewayError;
use salescoach::llm::{ChatModel, ChatParams, GatewayConfig, LlmGateway, RetryPolicy};
use salescoach::session::{MemorySessionStore, SessionManager, SessionStore};

use salescoach_server::channels::{ChannelHandle, ChannelRegistry, PushMessage};
use salescoach_server::config::Config;
use salescoach_server::context::{AppContext, SharedContext};
use salescoach_server::orchestrator::{self, TurnInput};

const FAST_REPLY: &str = r#"{
    "suggested_response": "Ask how far the client drives in a typical week.",
    "suggested_questions": ["What is the weekly mileage?"],
    "optional_followup": "Offer a winter test drive",
    "seller_questions": ["Did the client sound worried or curious?"],
    "client_style": "analytical",
    "confidence_score": 0.82,
    "confidence_reason": "grounded in range data"
}"#;

const DEEP_REPLY: &str = r#"{
    "overall_confidence": 77,
    "journey_stage": "Analiza",
    "modules": {
        "client_summary": { "confidence": 80, "summary": "range-anxious commuter", "key_facts": ["500 km weekly"] },
        "tactical_indicators": { "confidence": 70, "purchase_temperature": 64, "churn_risk": 25, "objections": ["winter range"] }
    }
}"#;

#[derive(Clone)]
enum Behavior {
    Reply(&'static str),
    SlowReply(Duration, &'static str),
    Fail(fn() -> GatewayError),
}

struct StubModel {
    id: &'static str,
    behavior: Behavior,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl StubModel {
    fn new(id: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id,
            behavior,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatModel for StubModel {
    fn model_id(&self) -> &str {
        self.id
    }

    async fn chat(&self, _prompt: &str, _params: &ChatParams) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let result = match &self.behavior {
            Behavior::Reply(body) => Ok(body.to_string()),
            Behavior::SlowReply(delay, body) => {
                tokio::time::sleep(*delay).await;
                Ok(body.to_string())
            }
            Behavior::Fail(make) => Err(make()),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.fast_deadline = Duration::from_millis(250);
    config.slow_deadline = Duration::from_secs(2);
    config.slow_start_delay = Duration::from_millis(10);
    config.channel_probe_window = Duration::from_millis(200);
    config.channel_probe_interval = Duration::from_millis(10);
    config.gateway = GatewayConfig {
        fast_call_deadline: Duration::from_millis(200),
        deep_call_deadline: Duration::from_secs(1),
        retry: RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(1),
        },
    };
    config
}

struct Harness {
    ctx: SharedContext,
    store: Arc<MemorySessionStore>,
    fast: Arc<StubModel>,
    deep: Arc<StubModel>,
}

fn harness(fast_behavior: Behavior, deep_behavior: Behavior, slow_width: usize) -> Harness {
    let config = test_config();
    let store = Arc::new(MemorySessionStore::new());
    let fast = StubModel::new("fast-stub", fast_behavior);
    let deep = StubModel::new("deep-stub", deep_behavior);
    let gateway = LlmGateway::new(fast.clone(), deep.clone(), config.gateway.clone());
    let ctx = Arc::new(AppContext {
        sessions: SessionManager::new(Some(store.clone() as Arc<dyn SessionStore>)),
        retrieval: None,
        gateway: Some(Arc::new(gateway)),
        channels: ChannelRegistry::new(),
        slow_gate: Arc::new(Semaphore::new(slow_width)),
        market: MarketData::default(),
        toggles: EnrichmentToggles::default(),
        config,
    });
    Harness {
        ctx,
        store,
        fast,
        deep,
    }
}

fn turn(session_id: &SessionId, note: &str) -> TurnInput {
    TurnInput {
        session_id: session_id.clone(),
        user_input: note.to_string(),
        journey_stage: JourneyStage::Discovery,
        language: Language::En,
    }
}

/// Polls until the session has `count` analyses or the timeout elapses.
async fn wait_for_analyses(store: &MemorySessionStore, id: &SessionId, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if store.analyses(id).await.len() >= count {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "expected {} analyses, found {}",
                count,
                store.analyses(id).await.len()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn happy_turn_replies_and_persists_in_order() {
    let h = harness(Behavior::Reply(FAST_REPLY), Behavior::Reply(DEEP_REPLY), 5);
    let session = h.ctx.sessions.create().await.unwrap();

    let reply = orchestrator::handle_turn(&h.ctx, turn(&session.id, "client asks about winter range")).await;

    assert_eq!(reply.session_id, session.id);
    assert!(reply.suggested_response.contains("week"));
    assert_eq!(h.fast.calls.load(Ordering::SeqCst), 1);
    assert_eq!(reply.client_style, ClientStyle::Analytical);
    assert!((0.0..=1.0).contains(&reply.confidence_score));
    assert_eq!(reply.journey_stage, JourneyStage::Discovery);

    let entries = h.ctx.sessions.full_history(&session.id).await.unwrap();
    let roles: Vec<LogRole> = entries.iter().map(|e| e.role).collect();
    assert_eq!(roles, vec![LogRole::Seller, LogRole::FastReply, LogRole::FastMeta]);
    assert_eq!(entries[0].content, "client asks about winter range");
    // Every non-seller entry is preceded by a seller entry.
    assert!(entries[0].ts <= entries[1].ts);

    // The meta entry encodes the remaining fields as one structured string.
    let meta: serde_json::Value = serde_json::from_str(&entries[2].content).unwrap();
    assert_eq!(meta["client_style"], "analytical");
    assert_eq!(meta["confidence_score"], 0.82);

    wait_for_analyses(&h.store, &session.id, 1).await;
    let analyses = h.store.analyses(&session.id).await;
    assert_eq!(analyses[0].status, AnalysisStatus::Success);
    assert_eq!(analyses[0].payload["overall_confidence"], 77);

    // The recommended stage differed, so the session was updated.
    let stored = h.ctx.sessions.get(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.journey_stage, JourneyStage::Analysis);
}

#[tokio::test]
async fn provisional_id_is_upgraded_and_persisted() {
    let h = harness(Behavior::Reply(FAST_REPLY), Behavior::Reply(DEEP_REPLY), 5);
    let provisional = SessionId::from_raw("TEMP-local-1");

    let reply = orchestrator::handle_turn(&h.ctx, turn(&provisional, "first contact")).await;

    assert!(reply.session_id.is_committed());
    assert_ne!(reply.session_id, provisional);
    // The committed id is queryable and carries the just-sent turn.
    let view = h.ctx.sessions.fetch(&reply.session_id).await.unwrap();
    assert_eq!(view.entries[0].content, "first contact");
}

#[tokio::test]
async fn two_identical_turns_yield_two_pairs_and_two_analyses() {
    let h = harness(Behavior::Reply(FAST_REPLY), Behavior::Reply(DEEP_REPLY), 5);
    let session = h.ctx.sessions.create().await.unwrap();

    orchestrator::handle_turn(&h.ctx, turn(&session.id, "same note")).await;
    orchestrator::handle_turn(&h.ctx, turn(&session.id, "same note")).await;

    let entries = h.ctx.sessions.full_history(&session.id).await.unwrap();
    let sellers = entries.iter().filter(|e| e.role == LogRole::Seller).count();
    let replies = entries.iter().filter(|e| e.role == LogRole::FastReply).count();
    assert_eq!(sellers, 2);
    assert_eq!(replies, 2);

    wait_for_analyses(&h.store, &session.id, 2).await;
}

#[tokio::test]
async fn deadline_miss_soft_fails_but_still_spawns_slow_path() {
    let h = harness(
        Behavior::SlowReply(Duration::from_secs(3), FAST_REPLY),
        Behavior::Reply(DEEP_REPLY),
        5,
    );
    let session = h.ctx.sessions.create().await.unwrap();

    let started = tokio::time::Instant::now();
    let reply = orchestrator::handle_turn(&h.ctx, turn(&session.id, "slow model ahead")).await;
    assert!(started.elapsed() < Duration::from_secs(1), "soft failure must not hang");

    assert_eq!(reply.confidence_score, 0.0);
    assert!(reply.suggested_questions.is_empty());
    assert!(reply.seller_questions.is_empty());
    assert_eq!(reply.client_style, ClientStyle::Unknown);
    assert!(reply.suggested_response.contains("moment"));

    wait_for_analyses(&h.store, &session.id, 1).await;
}

#[tokio::test]
async fn soft_failure_is_localized() {
    let h = harness(
        Behavior::Fail(|| GatewayError::Provider("502".into())),
        Behavior::Reply(DEEP_REPLY),
        5,
    );
    let session = h.ctx.sessions.create().await.unwrap();
    let mut input = turn(&session.id, "notatka sprzedawcy");
    input.language = Language::Pl;
    let reply = orchestrator::handle_turn(&h.ctx, input).await;
    assert!(reply.suggested_response.contains("Asystent"));
    assert_eq!(reply.confidence_score, 0.0);
}

#[tokio::test]
async fn rate_limit_gets_a_distinct_message() {
    let h = harness(
        Behavior::Fail(|| GatewayError::RateLimited("429".into())),
        Behavior::Reply(DEEP_REPLY),
        5,
    );
    let session = h.ctx.sessions.create().await.unwrap();
    let reply = orchestrator::handle_turn(&h.ctx, turn(&session.id, "note")).await;
    assert!(reply.suggested_response.contains("rate limited"));
    wait_for_analyses(&h.store, &session.id, 1).await;
}

#[tokio::test]
async fn auth_failure_suppresses_the_slow_path() {
    let h = harness(
        Behavior::Fail(|| GatewayError::Auth("bad key".into())),
        Behavior::Reply(DEEP_REPLY),
        5,
    );
    let session = h.ctx.sessions.create().await.unwrap();
    let reply = orchestrator::handle_turn(&h.ctx, turn(&session.id, "note")).await;
    assert!(reply.suggested_response.contains("misconfigured"));

    // Give a would-be slow path ample time, then confirm none ran.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.store.analyses(&session.id).await.is_empty());
    assert_eq!(h.deep.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_path_pushes_to_an_attached_channel() {
    let h = harness(Behavior::Reply(FAST_REPLY), Behavior::Reply(DEEP_REPLY), 5);
    let session = h.ctx.sessions.create().await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    h.ctx
        .channels
        .attach(&session.id, ChannelHandle::new(tx))
        .await
        .unwrap();

    orchestrator::handle_turn(&h.ctx, turn(&session.id, "note")).await;

    let pushed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("push within deadline")
        .expect("channel open");
    match pushed {
        PushMessage::SlowPathComplete { data } => {
            assert_eq!(data["overall_confidence"], 77);
            assert!(data["modules"].is_object());
            assert_eq!(data["fallback_used"], false);
            assert_eq!(data["model_used"], "deep-stub");
        }
        other => panic!("unexpected push: {:?}", other),
    }

    // The Success entry exists with a non-later timestamp than the push.
    let analyses = h.store.analyses(&session.id).await;
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].status, AnalysisStatus::Success);
}

#[tokio::test]
async fn late_channel_attach_still_receives_the_push() {
    let h = harness(Behavior::Reply(FAST_REPLY), Behavior::Reply(DEEP_REPLY), 5);
    let session = h.ctx.sessions.create().await.unwrap();

    orchestrator::handle_turn(&h.ctx, turn(&session.id, "note")).await;

    // Attach after the Fast Path response, inside the probe window.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (tx, mut rx) = mpsc::channel(8);
    h.ctx
        .channels
        .attach(&session.id, ChannelHandle::new(tx))
        .await
        .unwrap();

    let pushed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("push within deadline")
        .expect("channel open");
    assert!(matches!(pushed, PushMessage::SlowPathComplete { .. }));
}

#[tokio::test]
async fn deep_outage_falls_back_to_fast_with_telemetry() {
    let h = harness(
        Behavior::Reply(DEEP_REPLY),
        Behavior::Fail(|| GatewayError::Provider("deep down".into())),
        5,
    );
    let session = h.ctx.sessions.create().await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    h.ctx
        .channels
        .attach(&session.id, ChannelHandle::new(tx))
        .await
        .unwrap();

    orchestrator::handle_turn(&h.ctx, turn(&session.id, "note")).await;

    let pushed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("push within deadline")
        .expect("channel open");
    match pushed {
        PushMessage::SlowPathComplete { data } => {
            assert_eq!(data["fallback_used"], true);
            assert_eq!(data["model_used"], "fast-stub");
            assert!(data["fallback_reason"]
                .as_str()
                .unwrap()
                .contains("deep down"));
            assert!(data["modules"].is_object());
        }
        other => panic!("unexpected push: {:?}", other),
    }
}

#[tokio::test]
async fn both_models_down_record_an_error_entry_and_error_push() {
    let h = harness(
        Behavior::Fail(|| GatewayError::Provider("fast down".into())),
        Behavior::Fail(|| GatewayError::Provider("deep down".into())),
        5,
    );
    let session = h.ctx.sessions.create().await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    h.ctx
        .channels
        .attach(&session.id, ChannelHandle::new(tx))
        .await
        .unwrap();

    orchestrator::handle_turn(&h.ctx, turn(&session.id, "note")).await;

    let pushed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("push within deadline")
        .expect("channel open");
    assert!(matches!(pushed, PushMessage::SlowPathError { .. }));

    wait_for_analyses(&h.store, &session.id, 1).await;
    let analyses = h.store.analyses(&session.id).await;
    assert_eq!(analyses[0].status, AnalysisStatus::Error);
}

#[tokio::test]
async fn semaphore_bounds_concurrent_analyses() {
    let h = harness(
        Behavior::Reply(FAST_REPLY),
        Behavior::SlowReply(Duration::from_millis(150), DEEP_REPLY),
        2,
    );

    let mut sessions = Vec::new();
    for _ in 0..4 {
        let session = h.ctx.sessions.create().await.unwrap();
        orchestrator::handle_turn(&h.ctx, turn(&session.id, "note")).await;
        sessions.push(session.id);
    }

    for id in &sessions {
        wait_for_analyses(&h.store, id, 1).await;
    }
    // All analyses completed, but never more than the semaphore width at once.
    assert!(h.deep.max_active.load(Ordering::SeqCst) <= 2);
    assert_eq!(h.deep.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn parallel_creates_yield_distinct_committed_ids() {
    let h = harness(Behavior::Reply(FAST_REPLY), Behavior::Reply(DEEP_REPLY), 5);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let ctx = h.ctx.clone();
        handles.push(tokio::spawn(async move {
            ctx.sessions.create().await.unwrap().id
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    let unique: std::collections::HashSet<_> = ids.iter().map(|id| id.as_str().to_string()).collect();
    assert_eq!(unique.len(), ids.len());
    assert!(ids.iter().all(|id| id.is_committed()));
}

#[tokio::test]
async fn refinement_returns_and_records_the_down_vote() {
    const REFINE_REPLY: &str = r#"{ "refined_suggestion": "Lead with charging-at-home costs instead." }"#;
    let h = harness(Behavior::Reply(REFINE_REPLY), Behavior::Reply(DEEP_REPLY), 5);
    let session = h.ctx.sessions.create().await.unwrap();

    let reply = orchestrator::handle_refine(
        &h.ctx,
        orchestrator::RefineInput {
            session_id: session.id.clone(),
            original_input: "client worried about price".into(),
            bad_suggestion: "push the premium trim".into(),
            criticism: "too aggressive".into(),
            language: Language::En,
        },
    )
    .await;
    assert!(reply.refined_suggestion.contains("charging-at-home"));

    let feedback = h.store.feedback(&session.id).await;
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].polarity, salescoach::domain::Polarity::Down);
    assert_eq!(
        feedback[0].refined_suggestion.as_deref(),
        Some("Lead with charging-at-home costs instead.")
    );
    assert_eq!(feedback[0].comment, "too aggressive");
}

//! Core library of the salescoach backend: domain types, session
//! persistence, the LLM gateway with graded fallbacks, the retrieval layer
//! and the deep-analysis document model.
//!
//! The server crate composes these into the dual-path request orchestrator.

pub mod analysis;
pub mod coaching;
pub mod domain;
pub mod enrichment;
pub mod error;
pub mod llm;
pub mod retrieval;
pub mod session;

pub use analysis::DeepAnalysis;
pub use coaching::{ClientStyle, FastSuggestion};
pub use domain::{JourneyStage, Language, LogRole, Outcome, Polarity, SessionId};
pub use error::{GatewayError, RetrievalError};
pub use llm::{AnalyzeOutcome, ChatModel, LlmGateway};
pub use retrieval::{RetrievalEngine, NO_CONTEXT};
pub use session::{SessionManager, SessionStore, StoreError};

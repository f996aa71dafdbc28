use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AnalysisRecord, AnalysisStatus, FeedbackRecord, JourneyStage, Language, LogEntry, LogRole,
    Outcome, SessionId, SessionRecord,
};

/// An error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(SessionId),
    #[error("session already exists: {0}")]
    AlreadyExists(SessionId),
    #[error("provisional session id used where committed required: {0}")]
    InvalidSessionId(SessionId),
    #[error("database error: {0}")]
    Db(String),
    #[error("serialization error: {0}")]
    Codec(String),
}

/// A log entry about to be appended (id and timestamp assigned by the store).
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub session_id: SessionId,
    pub role: LogRole,
    pub content: String,
    pub language: Language,
}

/// An analysis record about to be persisted.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub session_id: SessionId,
    pub payload: serde_json::Value,
    pub status: AnalysisStatus,
}

/// Trait abstracting the relational store behind the session manager.
///
/// Writes are auto-committed per call; no transaction spans a suspension
/// point. Any backend (Postgres in production, in-memory in tests and demo
/// runs) implements this trait.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Inserts a fresh session row. `AlreadyExists` signals an id collision
    /// so the caller can re-mint.
    async fn create_session(&self, session: &SessionRecord) -> Result<(), StoreError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Appends a conversation log entry. `NotFound` when the session row is
    /// missing.
    async fn append_entry(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError>;

    /// Full conversation log in timestamp order.
    async fn entries(&self, id: &SessionId) -> Result<Vec<LogEntry>, StoreError>;

    /// Marks the session terminated. Idempotent: a second call with any
    /// outcome is a no-op success.
    async fn end_session(
        &self,
        id: &SessionId,
        outcome: Outcome,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_stage(&self, id: &SessionId, stage: JourneyStage) -> Result<(), StoreError>;

    async fn add_analysis(&self, analysis: NewAnalysis) -> Result<AnalysisRecord, StoreError>;

    /// Latest analysis attempt by timestamp, if any.
    async fn latest_analysis(&self, id: &SessionId) -> Result<Option<AnalysisRecord>, StoreError>;

    async fn add_feedback(&self, feedback: &FeedbackRecord) -> Result<(), StoreError>;
}

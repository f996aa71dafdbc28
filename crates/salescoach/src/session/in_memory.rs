use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::store::{NewAnalysis, NewLogEntry, SessionStore, StoreError};
use crate::domain::{
    AnalysisRecord, FeedbackRecord, JourneyStage, LogEntry, Outcome, SessionId, SessionRecord,
};

struct SessionState {
    record: SessionRecord,
    entries: Vec<LogEntry>,
    analyses: Vec<AnalysisRecord>,
    feedback: Vec<FeedbackRecord>,
}

impl SessionState {
    fn new(record: SessionRecord) -> Self {
        Self {
            record,
            entries: Vec::new(),
            analyses: Vec::new(),
            feedback: Vec::new(),
        }
    }
}

/// An in-memory implementation of the `SessionStore` trait, backing tests
/// and store-less demo runs.
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, SessionState>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    async fn bump_id(&self) -> i64 {
        let mut next = self.next_id.lock().await;
        let id = *next;
        *next += 1;
        id
    }

    /// All stored feedback, oldest first. Test/introspection helper.
    pub async fn feedback(&self, id: &SessionId) -> Vec<FeedbackRecord> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(id)
            .map(|s| s.feedback.clone())
            .unwrap_or_default()
    }

    /// All stored analyses, oldest first. Test/introspection helper.
    pub async fn analyses(&self, id: &SessionId) -> Vec<AnalysisRecord> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(id)
            .map(|s| s.analyses.clone())
            .unwrap_or_default()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists(session.id.clone()));
        }
        sessions.insert(session.id.clone(), SessionState::new(session.clone()));
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(id).map(|s| s.record.clone()))
    }

    async fn append_entry(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let id = self.bump_id().await;
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(&entry.session_id)
            .ok_or_else(|| StoreError::NotFound(entry.session_id.clone()))?;
        let stored = LogEntry {
            id,
            session_id: entry.session_id,
            ts: Utc::now(),
            role: entry.role,
            content: entry.content,
            language: entry.language,
        };
        state.entries.push(stored.clone());
        Ok(stored)
    }

    async fn entries(&self, id: &SessionId) -> Result<Vec<LogEntry>, StoreError> {
        let sessions = self.sessions.lock().await;
        let state = sessions
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(state.entries.clone())
    }

    async fn end_session(
        &self,
        id: &SessionId,
        outcome: Outcome,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if state.record.ended_at.is_none() {
            state.record.ended_at = Some(at);
            state.record.outcome = Some(outcome);
        }
        Ok(())
    }

    async fn set_stage(&self, id: &SessionId, stage: JourneyStage) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        state.record.journey_stage = stage;
        Ok(())
    }

    async fn add_analysis(&self, analysis: NewAnalysis) -> Result<AnalysisRecord, StoreError> {
        let id = self.bump_id().await;
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(&analysis.session_id)
            .ok_or_else(|| StoreError::NotFound(analysis.session_id.clone()))?;
        let stored = AnalysisRecord {
            id,
            session_id: analysis.session_id,
            ts: Utc::now(),
            payload: analysis.payload,
            status: analysis.status,
        };
        state.analyses.push(stored.clone());
        Ok(stored)
    }

    async fn latest_analysis(&self, id: &SessionId) -> Result<Option<AnalysisRecord>, StoreError> {
        let sessions = self.sessions.lock().await;
        let state = sessions
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(state.analyses.last().cloned())
    }

    async fn add_feedback(&self, feedback: &FeedbackRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(&feedback.session_id)
            .ok_or_else(|| StoreError::NotFound(feedback.session_id.clone()))?;
        state.feedback.push(feedback.clone());
        Ok(())
    }
}

use chrono::Utc;
use log::warn;
use std::sync::Arc;

use super::store::{NewLogEntry, SessionStore, StoreError};
use crate::domain::{
    AnalysisRecord, FeedbackRecord, Language, LogEntry, LogRole, Outcome, SessionId, SessionRecord,
};

/// How many of the most recent turns survive smart truncation in full.
pub const HISTORY_TURNS: usize = 20;

/// How many attempts to find a free committed id before giving up.
const MINT_ATTEMPTS: usize = 8;

/// Conversation history after smart truncation: the most recent turns in
/// full, preceded by a one-line summary of whatever was cut.
#[derive(Debug, Clone)]
pub struct History {
    /// `None` when nothing was truncated.
    pub summary: Option<String>,
    pub entries: Vec<LogEntry>,
    pub truncated: bool,
}

/// Session row together with its log and latest analysis, for read-back.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session: SessionRecord,
    pub entries: Vec<LogEntry>,
    pub latest_analysis: Option<AnalysisRecord>,
}

/// Session identity and persistence front. The store is optional: when it is
/// absent the conversation continues in a degraded, non-persistent mode.
#[derive(Clone)]
pub struct SessionManager {
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionManager {
    pub fn new(store: Option<Arc<dyn SessionStore>>) -> Self {
        Self { store }
    }

    pub fn store_available(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&Arc<dyn SessionStore>, StoreError> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::Db("session store is not configured".into()))
    }

    /// Mints and persists a fresh committed session with server defaults.
    pub async fn create(&self) -> Result<SessionRecord, StoreError> {
        let store = self.store()?;
        let mut last_err = None;
        for _ in 0..MINT_ATTEMPTS {
            let record = SessionRecord::new(SessionId::mint());
            match store.create_session(&record).await {
                Ok(()) => return Ok(record),
                Err(StoreError::AlreadyExists(id)) => {
                    warn!("session id collision on {}, re-minting", id);
                    last_err = Some(StoreError::AlreadyExists(id));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Db("id minting exhausted".into())))
    }

    /// Normalizes a session id to committed form.
    ///
    /// Provisional ids are swapped for a freshly minted committed id that is
    /// persisted before returning; committed ids pass through unchanged,
    /// whether or not the store knows them. Store failures degrade to an
    /// unpersisted minted id rather than blocking the turn.
    pub async fn ensure_committed(&self, id: &SessionId) -> SessionId {
        if !id.is_provisional() {
            return id.clone();
        }
        match &self.store {
            Some(store) => {
                let mut record = SessionRecord::new(SessionId::mint());
                for _ in 0..MINT_ATTEMPTS {
                    match store.create_session(&record).await {
                        Ok(()) => return record.id,
                        Err(StoreError::AlreadyExists(_)) => {
                            record = SessionRecord::new(SessionId::mint());
                        }
                        Err(e) => {
                            warn!("session commit failed, continuing unpersisted: {}", e);
                            return record.id;
                        }
                    }
                }
                record.id
            }
            None => SessionId::mint(),
        }
    }

    /// Appends a conversation log entry. `Ok(None)` when no store is
    /// configured (degraded mode).
    pub async fn append(
        &self,
        id: &SessionId,
        role: LogRole,
        content: impl Into<String>,
        language: Language,
    ) -> Result<Option<LogEntry>, StoreError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let entry = store
            .append_entry(NewLogEntry {
                session_id: id.clone(),
                role,
                content: content.into(),
                language,
            })
            .await?;
        Ok(Some(entry))
    }

    /// History with smart truncation: the most recent `turns` seller turns
    /// (and their replies) in full, preceded by a one-line summary noting
    /// the count of earlier entries and the prefix of the first seller
    /// note. Callers normally pass [`HISTORY_TURNS`].
    pub async fn history(&self, id: &SessionId, turns: usize) -> Result<History, StoreError> {
        let entries = self.store()?.entries(id).await?;
        Ok(truncate_history(entries, turns))
    }

    /// The full, untruncated conversation log.
    pub async fn full_history(&self, id: &SessionId) -> Result<Vec<LogEntry>, StoreError> {
        self.store()?.entries(id).await
    }

    /// Terminates a session. Idempotent; rejects provisional ids.
    pub async fn end(&self, id: &SessionId, outcome: Outcome) -> Result<(), StoreError> {
        if id.is_provisional() {
            return Err(StoreError::InvalidSessionId(id.clone()));
        }
        self.store()?.end_session(id, outcome, Utc::now()).await
    }

    /// Session row + log + latest analysis, for `GET /sessions/{id}`.
    pub async fn fetch(&self, id: &SessionId) -> Result<SessionView, StoreError> {
        let store = self.store()?;
        let session = store
            .get_session(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let entries = store.entries(id).await?;
        let latest_analysis = store.latest_analysis(id).await?;
        Ok(SessionView {
            session,
            entries,
            latest_analysis,
        })
    }

    pub async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        self.store()?.get_session(id).await
    }

    pub async fn set_stage(
        &self,
        id: &SessionId,
        stage: crate::domain::JourneyStage,
    ) -> Result<(), StoreError> {
        self.store()?.set_stage(id, stage).await
    }

    pub async fn record_analysis(
        &self,
        analysis: super::store::NewAnalysis,
    ) -> Result<AnalysisRecord, StoreError> {
        self.store()?.add_analysis(analysis).await
    }

    pub async fn add_feedback(&self, feedback: &FeedbackRecord) -> Result<(), StoreError> {
        self.store()?.add_feedback(feedback).await
    }
}

/// Keeps the last `turns` seller turns (a seller entry plus everything up to
/// the next seller entry) and summarizes the rest into one line.
fn truncate_history(entries: Vec<LogEntry>, turns: usize) -> History {
    let mut seller_seen = 0usize;
    let mut cut = 0usize;
    for (idx, entry) in entries.iter().enumerate().rev() {
        if entry.role == LogRole::Seller {
            seller_seen += 1;
            if seller_seen == turns {
                cut = idx;
                break;
            }
        }
    }
    if seller_seen < turns || cut == 0 {
        return History {
            summary: None,
            entries,
            truncated: false,
        };
    }

    let dropped = &entries[..cut];
    let first_note = dropped
        .iter()
        .find(|e| e.role == LogRole::Seller)
        .map(|e| note_prefix(&e.content))
        .unwrap_or_default();
    let summary = format!(
        "[{} earlier entries omitted; conversation opened with: \"{}\"]",
        dropped.len(),
        first_note
    );
    History {
        summary: Some(summary),
        entries: entries[cut..].to_vec(),
        truncated: true,
    }
}

fn note_prefix(content: &str) -> String {
    const PREFIX_CHARS: usize = 60;
    if content.chars().count() <= PREFIX_CHARS {
        content.to_string()
    } else {
        let prefix: String = content.chars().take(PREFIX_CHARS).collect();
        format!("{}…", prefix)
    }
}

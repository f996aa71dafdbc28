use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::store::{NewAnalysis, NewLogEntry, SessionStore, StoreError};
use crate::domain::{
    AnalysisRecord, AnalysisStatus, FeedbackRecord, JourneyStage, Language, LogEntry, LogRole,
    Outcome, SessionId, SessionRecord,
};

/// A Postgres implementation of the `SessionStore` trait.
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Connects and initializes the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Db(format!("failed to connect to Postgres: {}", e)))?;

        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates tables and indices when they do not exist yet.
    async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                ended_at TIMESTAMPTZ,
                outcome TEXT,
                journey_stage TEXT NOT NULL,
                language TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS conversation_log (
                id BIGSERIAL PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                ts TIMESTAMPTZ NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                language TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_conversation_log_session
                ON conversation_log(session_id, ts)",
            "CREATE TABLE IF NOT EXISTS deep_analysis (
                id BIGSERIAL PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                ts TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL,
                status TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_deep_analysis_session
                ON deep_analysis(session_id, ts)",
            "CREATE TABLE IF NOT EXISTS feedback (
                id BIGSERIAL PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                entry_id BIGINT,
                polarity TEXT NOT NULL,
                seller_note TEXT NOT NULL,
                suggestion TEXT NOT NULL,
                comment TEXT NOT NULL,
                language TEXT NOT NULL,
                refined_suggestion TEXT,
                ts TIMESTAMPTZ NOT NULL
            )",
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| StoreError::Db(format!("migration failed: {}", e)))?;
        }

        debug!("postgres schema migrations completed");
        Ok(())
    }

    fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<SessionRecord, StoreError> {
        let id: String = row.try_get("id").map_err(db_err)?;
        let outcome: Option<String> = row.try_get("outcome").map_err(db_err)?;
        let stage: String = row.try_get("journey_stage").map_err(db_err)?;
        let language: String = row.try_get("language").map_err(db_err)?;
        Ok(SessionRecord {
            id: SessionId::from_raw(id),
            created_at: row.try_get("created_at").map_err(db_err)?,
            ended_at: row.try_get("ended_at").map_err(db_err)?,
            outcome: outcome.as_deref().and_then(Outcome::parse_alias),
            journey_stage: JourneyStage::parse_alias(&stage).unwrap_or_default(),
            language: Language::parse_alias(&language).unwrap_or_default(),
        })
    }

    fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<LogEntry, StoreError> {
        let session_id: String = row.try_get("session_id").map_err(db_err)?;
        let role: String = row.try_get("role").map_err(db_err)?;
        let language: String = row.try_get("language").map_err(db_err)?;
        Ok(LogEntry {
            id: row.try_get("id").map_err(db_err)?,
            session_id: SessionId::from_raw(session_id),
            ts: row.try_get("ts").map_err(db_err)?,
            role: LogRole::parse(&role)
                .ok_or_else(|| StoreError::Codec(format!("unknown log role: {}", role)))?,
            content: row.try_get("content").map_err(db_err)?,
            language: Language::parse_alias(&language).unwrap_or_default(),
        })
    }

    fn analysis_from_row(row: &sqlx::postgres::PgRow) -> Result<AnalysisRecord, StoreError> {
        let session_id: String = row.try_get("session_id").map_err(db_err)?;
        let status: String = row.try_get("status").map_err(db_err)?;
        Ok(AnalysisRecord {
            id: row.try_get("id").map_err(db_err)?,
            session_id: SessionId::from_raw(session_id),
            ts: row.try_get("ts").map_err(db_err)?,
            payload: row.try_get("payload").map_err(db_err)?,
            status: AnalysisStatus::parse(&status)
                .ok_or_else(|| StoreError::Codec(format!("unknown analysis status: {}", status)))?,
        })
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Db(e.to_string())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO sessions (id, created_at, ended_at, outcome, journey_stage, language)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(session.id.as_str())
        .bind(session.created_at)
        .bind(session.ended_at)
        .bind(session.outcome.map(|o| o.as_str()))
        .bind(session.journey_stage.as_str())
        .bind(session.language.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Db(format!("failed to insert session: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(session.id.clone()));
        }
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, created_at, ended_at, outcome, journey_stage, language
             FROM sessions WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Db(format!("failed to fetch session: {}", e)))?;

        row.as_ref().map(Self::session_from_row).transpose()
    }

    async fn append_entry(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sessions WHERE id = $1)")
            .bind(entry.session_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        if !exists {
            return Err(StoreError::NotFound(entry.session_id));
        }

        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO conversation_log (session_id, ts, role, content, language)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(entry.session_id.as_str())
        .bind(now)
        .bind(entry.role.as_str())
        .bind(&entry.content)
        .bind(entry.language.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Db(format!("failed to append log entry: {}", e)))?;

        Ok(LogEntry {
            id: row.try_get("id").map_err(db_err)?,
            session_id: entry.session_id,
            ts: now,
            role: entry.role,
            content: entry.content,
            language: entry.language,
        })
    }

    async fn entries(&self, id: &SessionId) -> Result<Vec<LogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, session_id, ts, role, content, language
             FROM conversation_log WHERE session_id = $1 ORDER BY ts ASC, id ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Db(format!("failed to fetch log entries: {}", e)))?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn end_session(
        &self,
        id: &SessionId,
        outcome: Outcome,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Idempotent: only the first call sets the terminal fields.
        let result = sqlx::query(
            "UPDATE sessions SET ended_at = $2, outcome = $3
             WHERE id = $1 AND ended_at IS NULL",
        )
        .bind(id.as_str())
        .bind(at)
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Db(format!("failed to end session: {}", e)))?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sessions WHERE id = $1)")
                    .bind(id.as_str())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(db_err)?;
            if !exists {
                return Err(StoreError::NotFound(id.clone()));
            }
        }
        Ok(())
    }

    async fn set_stage(&self, id: &SessionId, stage: JourneyStage) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sessions SET journey_stage = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(stage.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Db(format!("failed to update journey stage: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn add_analysis(&self, analysis: NewAnalysis) -> Result<AnalysisRecord, StoreError> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO deep_analysis (session_id, ts, payload, status)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(analysis.session_id.as_str())
        .bind(now)
        .bind(&analysis.payload)
        .bind(analysis.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Db(format!("failed to insert analysis: {}", e)))?;

        Ok(AnalysisRecord {
            id: row.try_get("id").map_err(db_err)?,
            session_id: analysis.session_id,
            ts: now,
            payload: analysis.payload,
            status: analysis.status,
        })
    }

    async fn latest_analysis(&self, id: &SessionId) -> Result<Option<AnalysisRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, session_id, ts, payload, status
             FROM deep_analysis WHERE session_id = $1
             ORDER BY ts DESC, id DESC LIMIT 1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Db(format!("failed to fetch analysis: {}", e)))?;

        row.as_ref().map(Self::analysis_from_row).transpose()
    }

    async fn add_feedback(&self, feedback: &FeedbackRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO feedback
                (session_id, entry_id, polarity, seller_note, suggestion, comment,
                 language, refined_suggestion, ts)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(feedback.session_id.as_str())
        .bind(feedback.entry_id)
        .bind(feedback.polarity.as_str())
        .bind(&feedback.seller_note)
        .bind(&feedback.suggestion)
        .bind(&feedback.comment)
        .bind(feedback.language.as_str())
        .bind(feedback.refined_suggestion.as_deref())
        .bind(feedback.ts)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Db(format!("failed to insert feedback: {}", e)))?;
        Ok(())
    }
}

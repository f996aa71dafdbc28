//! Per-session push channel registry.
//!
//! One channel per committed session id, latest writer wins. `detach` only
//! removes the registered channel when the connection identity matches, so a
//! stale disconnect never evicts a newer connection for the same session.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use salescoach::domain::SessionId;

/// Structured message pushed over a session channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    #[serde(rename = "slow_path_complete")]
    SlowPathComplete { data: serde_json::Value },
    #[serde(rename = "slow_path_error")]
    SlowPathError { message: String },
}

/// One registered connection: identity plus the sending half of its pump.
/// The pump task serializes writes per session.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub conn_id: Uuid,
    tx: mpsc::Sender<PushMessage>,
}

impl ChannelHandle {
    pub fn new(tx: mpsc::Sender<PushMessage>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            tx,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("provisional session id cannot attach a channel: {0}")]
    InvalidSessionId(SessionId),
}

/// Delivery result of [`ChannelRegistry::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    NoChannel,
    Failed,
}

#[derive(Clone, Default)]
pub struct ChannelRegistry {
    inner: Arc<Mutex<HashMap<SessionId, ChannelHandle>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel, replacing any prior one for the session.
    /// Provisional ids are rejected.
    pub async fn attach(
        &self,
        session_id: &SessionId,
        handle: ChannelHandle,
    ) -> Result<(), ChannelError> {
        if session_id.is_provisional() {
            return Err(ChannelError::InvalidSessionId(session_id.clone()));
        }
        let mut channels = self.inner.lock().await;
        channels.insert(session_id.clone(), handle);
        Ok(())
    }

    /// Delivers a message to the session's channel, if any. The sender is
    /// cloned out of the lock so a slow consumer never blocks the registry.
    pub async fn send(&self, session_id: &SessionId, message: PushMessage) -> SendOutcome {
        let tx = {
            let channels = self.inner.lock().await;
            channels.get(session_id).map(|h| h.tx.clone())
        };
        match tx {
            None => SendOutcome::NoChannel,
            Some(tx) => match tx.send(message).await {
                Ok(()) => SendOutcome::Delivered,
                Err(_) => SendOutcome::Failed,
            },
        }
    }

    /// Removes the registered channel iff it is the given connection.
    pub async fn detach(&self, session_id: &SessionId, conn_id: Uuid) {
        let mut channels = self.inner.lock().await;
        if channels.get(session_id).map(|h| h.conn_id) == Some(conn_id) {
            channels.remove(session_id);
        }
    }

    pub async fn has_channel(&self, session_id: &SessionId) -> bool {
        self.inner.lock().await.contains_key(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionId {
        SessionId::from_raw("S-ABC-123")
    }

    fn handle() -> (ChannelHandle, mpsc::Receiver<PushMessage>) {
        let (tx, rx) = mpsc::channel(4);
        (ChannelHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn rejects_provisional_ids() {
        let registry = ChannelRegistry::new();
        let (h, _rx) = handle();
        let err = registry
            .attach(&SessionId::from_raw("TEMP-abc"), h)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidSessionId(_)));
    }

    #[tokio::test]
    async fn latest_writer_wins() {
        let registry = ChannelRegistry::new();
        let (first, mut first_rx) = handle();
        let (second, mut second_rx) = handle();
        registry.attach(&session(), first).await.unwrap();
        registry.attach(&session(), second).await.unwrap();

        let outcome = registry
            .send(
                &session(),
                PushMessage::SlowPathError {
                    message: "x".into(),
                },
            )
            .await;
        assert_eq!(outcome, SendOutcome::Delivered);
        assert!(second_rx.try_recv().is_ok());
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn detach_only_removes_identical_connection() {
        let registry = ChannelRegistry::new();
        let (stale, _rx1) = handle();
        let stale_id = stale.conn_id;
        let (fresh, mut fresh_rx) = handle();
        registry.attach(&session(), stale).await.unwrap();
        registry.attach(&session(), fresh).await.unwrap();

        // The stale connection disconnecting must not evict the fresh one.
        registry.detach(&session(), stale_id).await;
        assert!(registry.has_channel(&session()).await);
        registry
            .send(
                &session(),
                PushMessage::SlowPathError {
                    message: "still here".into(),
                },
            )
            .await;
        assert!(fresh_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_without_channel_reports_no_channel() {
        let registry = ChannelRegistry::new();
        let outcome = registry
            .send(
                &session(),
                PushMessage::SlowPathError {
                    message: "x".into(),
                },
            )
            .await;
        assert_eq!(outcome, SendOutcome::NoChannel);
    }

    #[tokio::test]
    async fn send_to_closed_channel_reports_failed() {
        let registry = ChannelRegistry::new();
        let (h, rx) = handle();
        registry.attach(&session(), h).await.unwrap();
        drop(rx);
        let outcome = registry
            .send(
                &session(),
                PushMessage::SlowPathError {
                    message: "x".into(),
                },
            )
            .await;
        assert_eq!(outcome, SendOutcome::Failed);
    }

    #[test]
    fn push_messages_carry_type_discriminator() {
        let complete = PushMessage::SlowPathComplete {
            data: serde_json::json!({ "overall_confidence": 70 }),
        };
        let json = serde_json::to_value(&complete).unwrap();
        assert_eq!(json["type"], "slow_path_complete");
        assert_eq!(json["data"]["overall_confidence"], 70);

        let error = PushMessage::SlowPathError {
            message: "boom".into(),
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "slow_path_error");
        assert_eq!(json["message"], "boom");
    }
}

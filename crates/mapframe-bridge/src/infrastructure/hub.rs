//! Registry of connected hosting-page sessions.
//!
//! [`SessionHub`] is the bridge's [`Channel`] when it runs behind the
//! WebSocket server.  Each connected hosting page is one session, tagged with
//! the origin it presented during the handshake.  Posting serializes the
//! message once and hands the text to the matching sessions' writer tasks
//! through unbounded channels, so `post` never blocks the bridge task.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use mapframe_core::OutboundMessage;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Channel, ChannelError, TargetOrigin};

struct Session {
    origin: String,
    tx: UnboundedSender<String>,
}

/// Connected sessions, keyed by a per-connection id.
#[derive(Default)]
pub struct SessionHub {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a session and returns its id.
    pub fn register(&self, origin: impl Into<String>, tx: UnboundedSender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions().insert(
            id,
            Session {
                origin: origin.into(),
                tx,
            },
        );
        id
    }

    pub fn unregister(&self, id: Uuid) {
        self.sessions().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Channel for SessionHub {
    fn post(&self, message: OutboundMessage, target: TargetOrigin) -> Result<(), ChannelError> {
        let text = serde_json::to_string(&message)?;
        let mut sessions = self.sessions();

        let mut delivered = 0usize;
        let mut closed = Vec::new();
        for (id, session) in sessions.iter() {
            let matches = match &target {
                TargetOrigin::Exact(origin) => session.origin == *origin,
                TargetOrigin::Broadcast => true,
            };
            if !matches {
                continue;
            }
            if session.tx.send(text.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }

        // Writer tasks that already exited leave a closed sender behind.
        for id in closed {
            debug!("dropping closed session {id}");
            sessions.remove(&id);
        }

        if delivered == 0 {
            return Err(ChannelError::NoRecipient);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapframe_core::Notification;
    use tokio::sync::mpsc::unbounded_channel;

    fn ready() -> OutboundMessage {
        OutboundMessage::LayerStateChanged(Notification::layer_state_changed("roads", true, 1))
    }

    #[test]
    fn test_exact_target_reaches_only_matching_origin() {
        // Arrange
        let hub = SessionHub::new();
        let (a_tx, mut a_rx) = unbounded_channel();
        let (b_tx, mut b_rx) = unbounded_channel();
        hub.register("https://a.example", a_tx);
        hub.register("https://b.example", b_tx);

        // Act
        hub.post(ready(), TargetOrigin::Exact("https://a.example".into()))
            .unwrap();

        // Assert
        let text = a_rx.try_recv().unwrap();
        assert!(text.contains("LAYER_STATE_CHANGED"));
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_reaches_every_session() {
        let hub = SessionHub::new();
        let (a_tx, mut a_rx) = unbounded_channel();
        let (b_tx, mut b_rx) = unbounded_channel();
        hub.register("https://a.example", a_tx);
        hub.register("https://b.example", b_tx);

        hub.post(ready(), TargetOrigin::Broadcast).unwrap();

        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
    }

    #[test]
    fn test_no_matching_session_is_no_recipient() {
        let hub = SessionHub::new();
        let result = hub.post(ready(), TargetOrigin::Broadcast);
        assert!(matches!(result, Err(ChannelError::NoRecipient)));
    }

    #[test]
    fn test_closed_session_is_pruned() {
        let hub = SessionHub::new();
        let (tx, rx) = unbounded_channel();
        hub.register("https://a.example", tx);
        drop(rx);

        let result = hub.post(ready(), TargetOrigin::Broadcast);

        assert!(matches!(result, Err(ChannelError::NoRecipient)));
        assert!(hub.is_empty());
    }

    #[test]
    fn test_unregister_removes_session() {
        let hub = SessionHub::new();
        let (tx, _rx) = unbounded_channel();
        let id = hub.register("null", tx);
        hub.unregister(id);
        assert_eq!(hub.len(), 0);
    }
}

//! Session routing for live client connections.
//!
//! Sessions are grouped by account so one event can reach every open tab or
//! device of that account, or just the connection that asked for it.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};

pub type SessionId = u64;

/// A named event with positional arguments, as sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    pub event: String,
    pub args: Vec<Value>,
}

impl OutboundEvent {
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }
}

/// Handle for one live connection of an authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    account_id: i64,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn account_id(&self) -> i64 {
        self.account_id
    }
}

/// Who receives a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryScope {
    /// Only the requesting session.
    Session,
    /// Every live session of the requesting account.
    Account,
}

impl DeliveryScope {
    pub fn from_to_user(to_user: bool) -> Self {
        if to_user {
            DeliveryScope::Account
        } else {
            DeliveryScope::Session
        }
    }
}

type Room = HashMap<SessionId, mpsc::UnboundedSender<OutboundEvent>>;

/// Routes events to sessions and account groups.
pub struct SessionRouter {
    next_id: AtomicU64,
    rooms: RwLock<HashMap<i64, Room>>,
}

impl Default for SessionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRouter {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection for an account and return its outbound queue.
    pub async fn register(
        &self,
        account_id: i64,
    ) -> (Session, mpsc::UnboundedReceiver<OutboundEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut rooms = self.rooms.write().await;
        rooms.entry(account_id).or_default().insert(id, tx);

        tracing::debug!("Session {} joined account {}", id, account_id);
        (Session { id, account_id }, rx)
    }

    /// Drop a connection. Empty account groups are removed.
    pub async fn unregister(&self, session: &Session) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(&session.account_id) {
            room.remove(&session.id);
            if room.is_empty() {
                rooms.remove(&session.account_id);
            }
        }
        tracing::debug!("Session {} left account {}", session.id, session.account_id);
    }

    /// Number of live sessions of an account.
    pub async fn session_count(&self, account_id: i64) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(&account_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Send an event to one session. Returns whether it was queued.
    pub async fn emit_to_session(&self, session: &Session, event: OutboundEvent) -> bool {
        let rooms = self.rooms.read().await;
        let Some(tx) = rooms.get(&session.account_id).and_then(|r| r.get(&session.id)) else {
            tracing::warn!("Session {} is gone, dropping {}", session.id, event.event);
            return false;
        };

        if tx.send(event).is_err() {
            tracing::warn!("Session {} closed its outbound queue", session.id);
            return false;
        }
        true
    }

    /// Send an event to every session of an account. Returns how many received it.
    pub async fn emit_to_account(&self, account_id: i64, event: OutboundEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(&account_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, tx) in room {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::warn!("Session {} closed its outbound queue", id);
            }
        }
        delivered
    }

    /// Deliver to the requester alone or to its whole account group.
    pub async fn deliver(
        &self,
        session: &Session,
        scope: DeliveryScope,
        event: OutboundEvent,
    ) -> usize {
        match scope {
            DeliveryScope::Session => usize::from(self.emit_to_session(session, event).await),
            DeliveryScope::Account => self.emit_to_account(session.account_id, event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ping() -> OutboundEvent {
        OutboundEvent::new("ping", vec![json!(1)])
    }

    #[tokio::test]
    async fn test_emit_to_session_reaches_only_that_session() {
        let router = SessionRouter::new();
        let (a, mut rx_a) = router.register(1).await;
        let (_b, mut rx_b) = router.register(1).await;

        assert!(router.emit_to_session(&a, ping()).await);
        assert_eq!(rx_a.try_recv().unwrap(), ping());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emit_to_account_reaches_all_sessions_of_account() {
        let router = SessionRouter::new();
        let (_a, mut rx_a) = router.register(1).await;
        let (_b, mut rx_b) = router.register(1).await;
        let (_c, mut rx_c) = router.register(2).await;

        assert_eq!(router.emit_to_account(1, ping()).await, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_removes_session() {
        let router = SessionRouter::new();
        let (a, _rx_a) = router.register(1).await;
        let (b, _rx_b) = router.register(1).await;
        assert_eq!(router.session_count(1).await, 2);

        router.unregister(&a).await;
        assert_eq!(router.session_count(1).await, 1);
        assert!(!router.emit_to_session(&a, ping()).await);

        router.unregister(&b).await;
        assert_eq!(router.session_count(1).await, 0);
        assert_eq!(router.emit_to_account(1, ping()).await, 0);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_skipped() {
        let router = SessionRouter::new();
        let (a, rx_a) = router.register(1).await;
        let (_b, mut rx_b) = router.register(1).await;
        drop(rx_a);

        assert!(!router.emit_to_session(&a, ping()).await);
        assert_eq!(router.emit_to_account(1, ping()).await, 1);
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_deliver_scope() {
        let router = SessionRouter::new();
        let (a, _rx_a) = router.register(5).await;
        let (_b, _rx_b) = router.register(5).await;

        assert_eq!(router.deliver(&a, DeliveryScope::from_to_user(false), ping()).await, 1);
        assert_eq!(router.deliver(&a, DeliveryScope::from_to_user(true), ping()).await, 2);
    }
}

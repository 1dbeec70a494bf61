//! The shared, lock-protected registry handed to every connection task.

use parley_protocol::{Message, SessionId, UserId};
use parley_transport::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;

use crate::{
    ClientInfo, ClientSender, Departure, Directory, LeftSession,
    RegistryError, RegistryLimits, RegistrySnapshot, SessionInfo,
};

/// The single authoritative store of clients and sessions.
///
/// Each method takes the lock once and releases it before returning, so
/// every operation (check-then-act sequences included) is atomic with
/// respect to all other connections. No I/O happens under the lock:
/// [`broadcast`](Self::broadcast) copies the member queues out and sends
/// after unlocking.
///
/// Share it with `Arc<Registry>`.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<Directory>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            inner: Mutex::new(Directory::new(limits)),
        }
    }

    /// Registers a newly accepted connection.
    pub async fn add_client(
        &self,
        conn_id: ConnectionId,
        sender: ClientSender,
    ) -> Result<(), RegistryError> {
        self.inner.lock().await.add_client(conn_id, sender)
    }

    /// Tears a connection's client down in one step.
    pub async fn remove_client(&self, conn_id: ConnectionId) -> Option<Departure> {
        self.inner.lock().await.remove_client(conn_id)
    }

    /// Returns a copy of one client's entry.
    pub async fn client(&self, conn_id: ConnectionId) -> Option<ClientInfo> {
        self.inner.lock().await.client(conn_id)
    }

    /// Atomically checks that `user` is free and binds it to `conn_id`.
    pub async fn login(
        &self,
        conn_id: ConnectionId,
        user: UserId,
    ) -> Result<(), RegistryError> {
        self.inner.lock().await.login(conn_id, user)
    }

    /// Returns `true` if some connection is logged in as `user`.
    pub async fn is_identity_logged_in(&self, user: &UserId) -> bool {
        self.inner.lock().await.is_identity_logged_in(user)
    }

    /// Looks up a session.
    pub async fn find_session(&self, session: &SessionId) -> Option<SessionInfo> {
        self.inner.lock().await.find_session(session)
    }

    /// Connections currently in `session`.
    pub async fn find_clients_by_session(
        &self,
        session: &SessionId,
    ) -> Vec<ConnectionId> {
        self.inner.lock().await.find_clients_by_session(session)
    }

    /// Creates `session` with the client as its first member.
    pub async fn create_session_if_absent(
        &self,
        conn_id: ConnectionId,
        session: SessionId,
    ) -> Result<(), RegistryError> {
        self.inner
            .lock()
            .await
            .create_session_if_absent(conn_id, session)
    }

    /// Adds the client to an existing session.
    pub async fn join_session(
        &self,
        conn_id: ConnectionId,
        session: SessionId,
    ) -> Result<(), RegistryError> {
        self.inner.lock().await.join_session(conn_id, session)
    }

    /// Removes the client from its session, dropping the session if empty.
    pub async fn leave_session(
        &self,
        conn_id: ConnectionId,
    ) -> Result<LeftSession, RegistryError> {
        self.inner.lock().await.leave_session(conn_id)
    }

    /// Removes `session` if nobody is in it.
    pub async fn remove_session_if_empty(&self, session: &SessionId) -> bool {
        self.inner.lock().await.remove_session_if_empty(session)
    }

    /// A consistent copy of the whole registry.
    pub async fn snapshot_all(&self) -> RegistrySnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Queues `message` for every member of `session` except `except`.
    ///
    /// Returns how many queues accepted it. Delivery is best effort: a
    /// member whose queue is full misses the message, and a member whose
    /// connection is already shutting down is skipped (its own teardown
    /// removes it).
    pub async fn broadcast(
        &self,
        session: &SessionId,
        except: ConnectionId,
        message: &Message,
    ) -> usize {
        let recipients = self.inner.lock().await.recipients(session, except);

        let mut delivered = 0;
        let mut dropped = 0;
        for sender in recipients {
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Closed(_)) => {}
            }
        }
        if dropped > 0 {
            tracing::warn!(%session, from = %except, dropped, "outbound queue full, message dropped");
        }
        tracing::debug!(%session, from = %except, delivered, "broadcast");
        delivered
    }

    /// Number of registered clients.
    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.client_count()
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.session_count()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_other_members_only() {
        let registry = Registry::default();
        let mut receivers = Vec::new();
        for i in 1..=3 {
            let (tx, rx) = mpsc::channel(8);
            let conn_id = ConnectionId::new(i);
            registry.add_client(conn_id, tx).await.unwrap();
            registry
                .login(conn_id, UserId::new(format!("user{i}")))
                .await
                .unwrap();
            receivers.push(rx);
        }
        let room = SessionId::new("room1");
        registry
            .create_session_if_absent(ConnectionId::new(1), room.clone())
            .await
            .unwrap();
        registry
            .join_session(ConnectionId::new(2), room.clone())
            .await
            .unwrap();

        let msg = Message::new(parley_protocol::MessageType::Chat, "user1", "hi")
            .unwrap();
        let delivered = registry.broadcast(&room, ConnectionId::new(1), &msg).await;

        assert_eq!(delivered, 1);
        assert_eq!(receivers[1].try_recv().unwrap(), msg);
        assert!(receivers[0].try_recv().is_err(), "sender is excluded");
        assert!(receivers[2].try_recv().is_err(), "outsider gets nothing");
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_queues() {
        let registry = Registry::default();
        let room = SessionId::new("room1");
        for i in 1..=2 {
            let (tx, rx) = mpsc::channel(8);
            drop(rx);
            let conn_id = ConnectionId::new(i);
            registry.add_client(conn_id, tx).await.unwrap();
            registry
                .login(conn_id, UserId::new(format!("user{i}")))
                .await
                .unwrap();
        }
        registry
            .create_session_if_absent(ConnectionId::new(1), room.clone())
            .await
            .unwrap();
        registry
            .join_session(ConnectionId::new(2), room.clone())
            .await
            .unwrap();

        let msg = Message::new(parley_protocol::MessageType::Chat, "user1", "hi")
            .unwrap();

        assert_eq!(registry.broadcast(&room, ConnectionId::new(1), &msg).await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_drops_for_full_queue() {
        let registry = Registry::default();
        let room = SessionId::new("room1");
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        for (i, tx) in [(1, mpsc::channel(8).0), (2, slow_tx), (3, fast_tx)] {
            let conn_id = ConnectionId::new(i);
            registry.add_client(conn_id, tx).await.unwrap();
            registry
                .login(conn_id, UserId::new(format!("user{i}")))
                .await
                .unwrap();
        }
        registry
            .create_session_if_absent(ConnectionId::new(1), room.clone())
            .await
            .unwrap();
        for i in 2..=3 {
            registry
                .join_session(ConnectionId::new(i), room.clone())
                .await
                .unwrap();
        }
        let first = Message::new(parley_protocol::MessageType::Chat, "user1", "one")
            .unwrap();
        let second = Message::new(parley_protocol::MessageType::Chat, "user1", "two")
            .unwrap();

        assert_eq!(registry.broadcast(&room, ConnectionId::new(1), &first).await, 2);
        assert_eq!(registry.broadcast(&room, ConnectionId::new(1), &second).await, 1);

        assert_eq!(slow_rx.try_recv().unwrap(), first);
        assert!(slow_rx.try_recv().is_err(), "second message was dropped");
        assert_eq!(fast_rx.try_recv().unwrap(), first);
        assert_eq!(fast_rx.try_recv().unwrap(), second);
    }
}

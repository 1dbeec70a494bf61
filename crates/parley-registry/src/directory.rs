//! The client and session tables and every rule that keeps them consistent.
//!
//! [`Directory`] is a plain synchronous struct. It has no lock of its own:
//! [`Registry`](crate::Registry) owns one behind a mutex, which makes each
//! method here one atomic registry operation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parley_protocol::{Message, SessionId, UserId};
use parley_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::{RegistryError, RegistrySnapshot};

/// The outbound queue of one connection.
///
/// Replies and broadcasts for a connection both go through this queue, so
/// they reach the socket in the order they were produced. The queue is
/// bounded; producers use `try_send` and never wait on a slow reader.
pub type ClientSender = mpsc::Sender<Message>;

/// Capacity bounds for the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    /// Most connections registered at once.
    pub max_clients: usize,
    /// Most sessions alive at once.
    pub max_sessions: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_clients: 1024,
            max_sessions: 256,
        }
    }
}

/// A copy of one client's registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// The connection the client arrived on.
    pub conn_id: ConnectionId,
    /// The logged-in identity, `None` until `LOGIN` succeeds.
    pub user: Option<UserId>,
    /// The session the client is in, if any.
    pub session: Option<SessionId>,
}

/// A copy of one session's registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// The session name.
    pub id: SessionId,
    /// Its members, in connection order.
    pub members: Vec<ConnectionId>,
}

/// What happened when a client left its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeftSession {
    /// The session that was left.
    pub session: SessionId,
    /// `true` if the client was the last member and the session is gone.
    pub removed: bool,
}

/// What was torn down by [`Directory::remove_client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// The identity the connection was logged in as.
    pub user: Option<UserId>,
    /// The session membership that was cleared, if there was one.
    pub left: Option<LeftSession>,
}

#[derive(Debug)]
struct ClientEntry {
    user: Option<UserId>,
    session: Option<SessionId>,
    sender: ClientSender,
}

/// Clients, sessions and the identity index.
///
/// Invariants that hold after every method returns:
///
/// - each connection has at most one client entry
/// - logged-in identities are unique across clients
/// - a client's session exists and lists the client as a member
/// - every session has at least one member
#[derive(Debug, Default)]
pub struct Directory {
    limits: RegistryLimits,
    clients: BTreeMap<ConnectionId, ClientEntry>,
    sessions: BTreeMap<SessionId, BTreeSet<ConnectionId>>,
    identities: HashMap<UserId, ConnectionId>,
}

impl Directory {
    /// Creates an empty directory with the given capacity bounds.
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// The capacity bounds this directory enforces.
    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    /// Registers a freshly accepted, anonymous connection.
    pub fn add_client(
        &mut self,
        conn_id: ConnectionId,
        sender: ClientSender,
    ) -> Result<(), RegistryError> {
        if self.clients.contains_key(&conn_id) {
            return Err(RegistryError::ClientExists(conn_id));
        }
        if self.clients.len() >= self.limits.max_clients {
            return Err(RegistryError::ClientLimit {
                max: self.limits.max_clients,
            });
        }
        self.clients.insert(
            conn_id,
            ClientEntry {
                user: None,
                session: None,
                sender,
            },
        );
        Ok(())
    }

    /// Tears a client down: leaves its session (removing the session if it
    /// is now empty), frees its identity and drops the entry.
    ///
    /// Returns `None` if the connection was not registered, so calling this
    /// twice is harmless.
    pub fn remove_client(&mut self, conn_id: ConnectionId) -> Option<Departure> {
        let left = self.detach(conn_id);
        let entry = self.clients.remove(&conn_id)?;
        if let Some(user) = &entry.user {
            self.identities.remove(user);
        }
        Some(Departure {
            user: entry.user,
            left,
        })
    }

    /// Returns a copy of one client's entry.
    pub fn client(&self, conn_id: ConnectionId) -> Option<ClientInfo> {
        self.clients.get(&conn_id).map(|entry| ClientInfo {
            conn_id,
            user: entry.user.clone(),
            session: entry.session.clone(),
        })
    }

    /// Records a successful login.
    ///
    /// The duplicate-identity check and the assignment happen in the same
    /// call, so two connections can never both log in as one user.
    pub fn login(
        &mut self,
        conn_id: ConnectionId,
        user: UserId,
    ) -> Result<(), RegistryError> {
        let entry = self
            .clients
            .get_mut(&conn_id)
            .ok_or(RegistryError::ClientNotFound(conn_id))?;
        if let Some(current) = &entry.user {
            return Err(RegistryError::AlreadyLoggedIn(current.clone()));
        }
        if self.identities.contains_key(&user) {
            return Err(RegistryError::DuplicateIdentity(user));
        }
        self.identities.insert(user.clone(), conn_id);
        entry.user = Some(user);
        Ok(())
    }

    /// Returns `true` if some connection is logged in as `user`.
    pub fn is_identity_logged_in(&self, user: &UserId) -> bool {
        self.identities.contains_key(user)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Looks up a session.
    pub fn find_session(&self, session: &SessionId) -> Option<SessionInfo> {
        self.sessions.get(session).map(|members| SessionInfo {
            id: session.clone(),
            members: members.iter().copied().collect(),
        })
    }

    /// Connections that are members of `session`, in connection order.
    ///
    /// Empty if the session does not exist.
    pub fn find_clients_by_session(&self, session: &SessionId) -> Vec<ConnectionId> {
        self.sessions
            .get(session)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Creates `session` and puts the client in it, in one step.
    ///
    /// Fails without changing anything if the client is not logged in, is
    /// already in a session, the name is taken, or the session limit is
    /// reached (checked in that order).
    pub fn create_session_if_absent(
        &mut self,
        conn_id: ConnectionId,
        session: SessionId,
    ) -> Result<(), RegistryError> {
        let entry = self
            .clients
            .get_mut(&conn_id)
            .ok_or(RegistryError::ClientNotFound(conn_id))?;
        if entry.user.is_none() {
            return Err(RegistryError::NotLoggedIn);
        }
        if let Some(current) = &entry.session {
            return Err(RegistryError::AlreadyInSession(current.clone()));
        }
        if self.sessions.contains_key(&session) {
            return Err(RegistryError::SessionExists(session));
        }
        if self.sessions.len() >= self.limits.max_sessions {
            return Err(RegistryError::SessionLimit {
                max: self.limits.max_sessions,
            });
        }

        entry.session = Some(session.clone());
        tracing::info!(%session, creator = %conn_id, "session created");
        self.sessions.insert(session, BTreeSet::from([conn_id]));
        Ok(())
    }

    /// Puts the client in an existing session.
    ///
    /// A missing session is reported before an existing membership.
    pub fn join_session(
        &mut self,
        conn_id: ConnectionId,
        session: SessionId,
    ) -> Result<(), RegistryError> {
        let entry = self
            .clients
            .get_mut(&conn_id)
            .ok_or(RegistryError::ClientNotFound(conn_id))?;
        if entry.user.is_none() {
            return Err(RegistryError::NotLoggedIn);
        }
        let Some(members) = self.sessions.get_mut(&session) else {
            return Err(RegistryError::SessionNotFound(session));
        };
        if let Some(current) = &entry.session {
            return Err(RegistryError::AlreadyInSession(current.clone()));
        }

        members.insert(conn_id);
        entry.session = Some(session);
        Ok(())
    }

    /// Takes the client out of its session, removing the session if it is
    /// left empty.
    pub fn leave_session(
        &mut self,
        conn_id: ConnectionId,
    ) -> Result<LeftSession, RegistryError> {
        if !self.clients.contains_key(&conn_id) {
            return Err(RegistryError::ClientNotFound(conn_id));
        }
        self.detach(conn_id).ok_or(RegistryError::NotInSession)
    }

    /// Removes `session` if it has no members. Returns `true` if it did.
    pub fn remove_session_if_empty(&mut self, session: &SessionId) -> bool {
        let empty = self
            .sessions
            .get(session)
            .is_some_and(BTreeSet::is_empty);
        if empty {
            self.sessions.remove(session);
            tracing::info!(%session, "session removed");
        }
        empty
    }

    // -----------------------------------------------------------------------
    // Fan-out and inspection
    // -----------------------------------------------------------------------

    /// Outbound queues of every member of `session` except `except`.
    pub fn recipients(
        &self,
        session: &SessionId,
        except: ConnectionId,
    ) -> Vec<ClientSender> {
        let Some(members) = self.sessions.get(session) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|conn_id| **conn_id != except)
            .filter_map(|conn_id| self.clients.get(conn_id))
            .map(|entry| entry.sender.clone())
            .collect()
    }

    /// A consistent copy of every client and session.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            clients: self
                .clients
                .iter()
                .map(|(conn_id, entry)| ClientInfo {
                    conn_id: *conn_id,
                    user: entry.user.clone(),
                    session: entry.session.clone(),
                })
                .collect(),
            sessions: self
                .sessions
                .iter()
                .map(|(id, members)| SessionInfo {
                    id: id.clone(),
                    members: members.iter().copied().collect(),
                })
                .collect(),
        }
    }

    /// Clears the client's session membership and drops the session if it
    /// became empty.
    fn detach(&mut self, conn_id: ConnectionId) -> Option<LeftSession> {
        let session = self.clients.get_mut(&conn_id)?.session.take()?;
        if let Some(members) = self.sessions.get_mut(&session) {
            members.remove(&conn_id);
        }
        let removed = self.remove_session_if_empty(&session);
        Some(LeftSession { session, removed })
    }
}

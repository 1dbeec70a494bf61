//! Error types for the registry layer.

use parley_protocol::{SessionId, UserId};
use parley_transport::ConnectionId;

/// Errors that can occur during registry operations.
///
/// Every failed operation leaves the registry exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No client is registered for this connection.
    #[error("no client for {0}")]
    ClientNotFound(ConnectionId),

    /// A client is already registered for this connection.
    #[error("client for {0} already registered")]
    ClientExists(ConnectionId),

    /// The connection has not logged in yet.
    #[error("not logged in")]
    NotLoggedIn,

    /// The connection is already logged in as this user.
    #[error("already logged in as {0}")]
    AlreadyLoggedIn(UserId),

    /// Another connection is logged in with this identity.
    #[error("user {0} is already logged in")]
    DuplicateIdentity(UserId),

    /// The session does not exist.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// A session with this name already exists.
    #[error("session {0} already exists")]
    SessionExists(SessionId),

    /// The client is already a member of a session.
    #[error("already in session {0}")]
    AlreadyInSession(SessionId),

    /// The client is not a member of any session.
    #[error("not in a session")]
    NotInSession,

    /// The registry holds as many clients as it is allowed to.
    #[error("client limit of {max} reached")]
    ClientLimit {
        /// The configured maximum.
        max: usize,
    },

    /// The registry holds as many sessions as it is allowed to.
    #[error("session limit of {max} reached")]
    SessionLimit {
        /// The configured maximum.
        max: usize,
    },
}

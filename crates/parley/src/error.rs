//! Unified error type for the Parley server.

use parley_auth::AuthError;
use parley_protocol::ProtocolError;
use parley_registry::RegistryError;
use parley_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates a `From` impl, so the
/// `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed frame, invalid field).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A credential check failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A registry operation was refused (limits, conflicts).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The server configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

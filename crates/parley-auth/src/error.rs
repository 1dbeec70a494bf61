//! Error types for the auth layer.

/// Errors an [`Authenticator`](crate::Authenticator) can report.
///
/// The server turns every variant into a `LOGIN_NAK`; the connection stays
/// open so the client can try again.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The user is unknown or the password does not match.
    ///
    /// The two cases are not told apart.
    #[error("invalid credentials")]
    InvalidCredentials,
}

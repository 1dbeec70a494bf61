//! Authentication hook for validating user credentials.
//!
//! The server calls [`Authenticator::authenticate`] for every `LOGIN` it
//! receives. Production deployments can plug in whatever backend they
//! like; [`StaticAuthenticator`] covers the built-in account table and
//! tests.

use std::collections::HashMap;
use std::future::Future;

use parley_protocol::UserId;

use crate::AuthError;

/// Checks a user name and password and returns the user's identity.
///
/// `Send + Sync + 'static` because one authenticator is shared by every
/// connection task for the lifetime of the server. The returned future is
/// `Send` so the engine can be driven from a spawned task.
///
/// # Example
///
/// ```rust
/// use parley_auth::{AuthError, Authenticator};
/// use parley_protocol::UserId;
///
/// /// Lets anyone in whose password is their name reversed.
/// struct MirrorAuthenticator;
///
/// impl Authenticator for MirrorAuthenticator {
///     async fn authenticate(
///         &self,
///         user: &str,
///         password: &str,
///     ) -> Result<UserId, AuthError> {
///         if password.chars().rev().eq(user.chars()) {
///             Ok(UserId::new(user))
///         } else {
///             Err(AuthError::InvalidCredentials)
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the credentials.
    ///
    /// # Returns
    /// - `Ok(UserId)`: the credentials are good, here is who they belong to
    /// - `Err(AuthError::InvalidCredentials)`: unknown user or bad password
    fn authenticate(
        &self,
        user: &str,
        password: &str,
    ) -> impl Future<Output = Result<UserId, AuthError>> + Send;
}

/// An [`Authenticator`] backed by an in-memory table of user names and
/// passwords.
///
/// [`Default`] yields the stock accounts `ken` and `andy`, both with
/// password `12345`. Use [`empty`](Self::empty) and
/// [`with_user`](Self::with_user) to build a different table.
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    users: HashMap<String, String>,
}

impl StaticAuthenticator {
    /// Creates an authenticator that rejects everyone.
    pub fn empty() -> Self {
        Self {
            users: HashMap::new(),
        }
    }

    /// Adds (or replaces) an account.
    pub fn with_user(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.users.insert(user.into(), password.into());
        self
    }

    /// Number of accounts in the table.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if the table has no accounts.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for StaticAuthenticator {
    fn default() -> Self {
        Self::empty()
            .with_user("ken", "12345")
            .with_user("andy", "12345")
    }
}

impl Authenticator for StaticAuthenticator {
    async fn authenticate(
        &self,
        user: &str,
        password: &str,
    ) -> Result<UserId, AuthError> {
        match self.users.get(user) {
            Some(expected) if expected == password => Ok(UserId::new(user)),
            _ => {
                tracing::debug!(user, "credentials rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

//! Login credential checking for Parley.
//!
//! The server never decides on its own whether a user name and password
//! are good. It asks an [`Authenticator`], and the crate ships one
//! implementation, [`StaticAuthenticator`], backed by a fixed table.
//!
//! Whether a user is *already* logged in is not this crate's concern; the
//! registry answers that, under the same lock that records the login.

mod auth;
mod error;

pub use auth::{Authenticator, StaticAuthenticator};
pub use error::AuthError;

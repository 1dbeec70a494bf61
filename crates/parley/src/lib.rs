//! # Parley
//!
//! A concurrent, line-framed TCP chat server.
//!
//! Clients log in, create or join named sessions, and chat with the other
//! members of their session. Each connection runs in its own task; all of
//! them share one [`Registry`](parley_registry::Registry) of clients and
//! sessions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parley::prelude::*;
//!
//! # async fn start() -> Result<(), ParleyError> {
//! let server = ParleyServer::<StaticAuthenticator, TextCodec>::builder()
//!     .bind("0.0.0.0:5000")
//!     .build(StaticAuthenticator::default())
//!     .await?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

mod config;
mod engine;
mod error;
mod handler;
mod server;

pub use config::{ServerConfig, DEFAULT_OUTBOUND_QUEUE};
pub use engine::{render_listing, Broadcast, Engine, Outcome};
pub use error::ParleyError;
pub use server::{ParleyServer, ParleyServerBuilder};

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::{ParleyError, ParleyServer, ParleyServerBuilder, ServerConfig};
    pub use parley_auth::{Authenticator, StaticAuthenticator};
    pub use parley_protocol::{Codec, Message, MessageType, TextCodec};
    pub use parley_registry::{Registry, RegistryLimits};
}

//! # Parley client
//!
//! The interactive side of Parley: parses slash commands, keeps track of
//! login and session state, and prints what the server sends back.
//!
//! ```rust,no_run
//! use parley_client::{run, ClientConfig};
//! use tokio::io::BufReader;
//!
//! # async fn start() -> Result<(), parley_client::ClientError> {
//! run(
//!     BufReader::new(tokio::io::stdin()),
//!     tokio::io::stdout(),
//!     ClientConfig::default(),
//! )
//! .await
//! # }
//! ```

mod command;
mod error;
mod runtime;
mod state;

pub use command::{Command, CommandError};
pub use error::ClientError;
pub use runtime::{run, ClientConfig};
pub use state::{Action, ClientState, Notice, Phase};

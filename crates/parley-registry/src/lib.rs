//! Client and session registry for Parley.
//!
//! The registry is the only place that knows who is connected, who is
//! logged in as whom, and which sessions exist with which members.
//!
//! # Key types
//!
//! - [`Directory`]: the tables and every rule that keeps them consistent,
//!   as plain `&mut self` methods
//! - [`Registry`]: a `Directory` behind one async mutex, shared by all
//!   connection tasks
//! - [`RegistrySnapshot`]: a consistent copy, used for `QUERY` replies and
//!   invariant checks
//! - [`RegistryLimits`]: capacity bounds

mod directory;
mod error;
mod registry;
mod snapshot;

pub use directory::{
    ClientInfo, ClientSender, Departure, Directory, LeftSession,
    RegistryLimits, SessionInfo,
};
pub use error::RegistryError;
pub use registry::Registry;
pub use snapshot::RegistrySnapshot;

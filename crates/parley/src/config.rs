//! Server configuration.

use parley_protocol::MAX_ENCODED_LEN;
use parley_registry::RegistryLimits;
use parley_transport::DEFAULT_MAX_FRAME_LEN;

use crate::ParleyError;

/// Settings for a [`ParleyServer`](crate::ParleyServer).
///
/// Usually filled in through
/// [`ParleyServerBuilder`](crate::ParleyServerBuilder) rather than directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `0.0.0.0:5000`.
    pub bind_addr: String,

    /// Longest accepted frame in bytes, terminator included.
    pub max_frame_len: usize,

    /// Client and session capacity bounds.
    pub limits: RegistryLimits,

    /// Messages that may wait in one connection's outbound queue. Broadcasts
    /// to a full queue are dropped; a connection whose own reply does not
    /// fit is closed.
    pub outbound_queue: usize,
}

/// Default [`ServerConfig::outbound_queue`].
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            limits: RegistryLimits::default(),
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl ServerConfig {
    /// Rejects settings the server cannot run with.
    ///
    /// # Errors
    /// Returns [`ParleyError::Config`] if the frame limit would cut off
    /// legal messages or a capacity bound or the queue size is zero.
    pub fn validate(&self) -> Result<(), ParleyError> {
        if self.max_frame_len < MAX_ENCODED_LEN {
            return Err(ParleyError::Config(format!(
                "max_frame_len {} is below the largest legal frame ({MAX_ENCODED_LEN} bytes)",
                self.max_frame_len
            )));
        }
        if self.limits.max_clients == 0 {
            return Err(ParleyError::Config("max_clients must be at least 1".into()));
        }
        if self.limits.max_sessions == 0 {
            return Err(ParleyError::Config(
                "max_sessions must be at least 1".into(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(ParleyError::Config(
                "outbound_queue must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

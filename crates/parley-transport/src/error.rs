/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Connecting to a remote server failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        /// The address we tried to reach.
        addr: String,
        /// The underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// A line exceeded the configured frame limit before its terminator.
    ///
    /// The rest of the oversized line has already been discarded, so the
    /// connection is still usable for the next frame.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLong {
        /// The configured maximum frame length in bytes.
        limit: usize,
    },
}

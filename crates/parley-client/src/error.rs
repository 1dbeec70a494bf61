//! Error types for the client.

/// Errors that end the client loop.
///
/// Network trouble is not among them: a failed connect or a dropped server
/// is reported to the user as a warning and the client keeps reading
/// commands.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Reading the next command line failed.
    #[error("failed to read input: {0}")]
    Input(#[source] std::io::Error),

    /// Writing to the terminal failed.
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

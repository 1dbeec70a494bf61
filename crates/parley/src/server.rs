//! `ParleyServer` builder and accept loop.
//!
//! This is the entry point for running a Parley chat server. It ties
//! together all the layers: transport → protocol → engine → registry.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use parley_auth::Authenticator;
use parley_protocol::{Codec, TextCodec};
use parley_registry::Registry;
use parley_transport::{TcpTransport, Transport};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::handler::handle_connection;
use crate::ParleyError;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. All mutable
/// state lives in the registry inside the engine.
pub(crate) struct ServerState<A, C> {
    pub(crate) engine: Engine<A>,
    pub(crate) codec: C,
    pub(crate) outbound_queue: usize,
}

/// Builder for configuring and starting a Parley server.
///
/// # Example
///
/// ```rust,no_run
/// use parley::prelude::*;
///
/// # async fn start() -> Result<(), ParleyError> {
/// let server = ParleyServer::<StaticAuthenticator, TextCodec>::builder()
///     .bind("0.0.0.0:5000")
///     .max_sessions(64)
///     .build(StaticAuthenticator::default())
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParleyServerBuilder {
    config: ServerConfig,
}

impl ParleyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the longest accepted frame, terminator included.
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    /// Sets how many connections may be registered at once.
    pub fn max_clients(mut self, max: usize) -> Self {
        self.config.limits.max_clients = max;
        self
    }

    /// Sets how many sessions may exist at once.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.limits.max_sessions = max;
        self
    }

    /// Sets how many messages may wait for one slow connection.
    pub fn outbound_queue(mut self, len: usize) -> Self {
        self.config.outbound_queue = len;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and binds the listener, speaking the
    /// default [`TextCodec`].
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<ParleyServer<A, TextCodec>, ParleyError> {
        self.build_with_codec(auth, TextCodec).await
    }

    /// Like [`build`](Self::build), with a custom codec.
    pub async fn build_with_codec<A, C>(
        self,
        auth: A,
        codec: C,
    ) -> Result<ParleyServer<A, C>, ParleyError>
    where
        A: Authenticator,
        C: Codec,
    {
        self.config.validate()?;

        let transport =
            TcpTransport::bind(&self.config.bind_addr, self.config.max_frame_len)
                .await?;
        let registry = Arc::new(Registry::new(self.config.limits));
        let state = Arc::new(ServerState {
            engine: Engine::new(registry, auth),
            codec,
            outbound_queue: self.config.outbound_queue,
        });

        Ok(ParleyServer { transport, state })
    }
}

/// A bound Parley server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct ParleyServer<A, C> {
    transport: TcpTransport,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> ParleyServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> ParleyServerBuilder {
        ParleyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry shared by every connection.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.state.engine.registry())
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ParleyError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// On shutdown the listener stops accepting, every connection handler
    /// is told to stop, and this returns once all of them have finished
    /// their teardown.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ParleyError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Parley server running");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        let stop = stop_rx.clone();
                        handlers.spawn(async move {
                            if let Err(e) = handle_connection(conn, state, stop).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "connection task panicked");
                    }
                }
            }
        }

        let _ = stop_tx.send(true);
        tracing::info!(open = handlers.len(), "waiting for connections to close");
        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "connection task panicked");
            }
        }
        tracing::info!("Parley server stopped");
        Ok(())
    }
}

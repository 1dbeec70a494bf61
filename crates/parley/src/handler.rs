//! Per-connection handler: registration, read loop, and teardown.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the client, refusing the connection if the registry is full
//!   2. Spawn a writer task that drains the connection's outbound queue
//!   3. Loop: receive frame → decode → dispatch → queue reply and broadcast
//!   4. Tear down exactly once, give the writer a bounded time to flush,
//!      and close the socket

use std::sync::Arc;
use std::time::Duration;

use parley_auth::Authenticator;
use parley_protocol::{Codec, Message};
use parley_registry::Registry;
use parley_transport::{Connection, ConnectionId, TcpConnection, TransportError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

use crate::server::ServerState;
use crate::ParleyError;

/// How long teardown waits for queued frames to reach a peer before giving
/// up on it.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Removes the client from the registry when the handler is done.
///
/// The normal path calls [`finish`](Self::finish). If the handler panics
/// first, `Drop` spawns the same cleanup, since `Drop` cannot await the
/// registry lock.
struct ClientGuard {
    conn_id: ConnectionId,
    registry: Option<Arc<Registry>>,
}

impl ClientGuard {
    fn new(conn_id: ConnectionId, registry: Arc<Registry>) -> Self {
        Self {
            conn_id,
            registry: Some(registry),
        }
    }

    /// Runs teardown: leave the session, drop it if empty, remove the client.
    async fn finish(mut self) {
        if let Some(registry) = self.registry.take() {
            teardown(&registry, self.conn_id).await;
        }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let Some(registry) = self.registry.take() else {
            return;
        };
        let conn_id = self.conn_id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                teardown(&registry, conn_id).await;
            });
        }
    }
}

async fn teardown(registry: &Registry, conn_id: ConnectionId) {
    let Some(departure) = registry.remove_client(conn_id).await else {
        return;
    };
    match departure.left {
        Some(left) => tracing::info!(
            %conn_id,
            user = departure.user.as_ref().map(|u| u.as_str()),
            session = %left.session,
            session_removed = left.removed,
            "client removed"
        ),
        None => tracing::info!(
            %conn_id,
            user = departure.user.as_ref().map(|u| u.as_str()),
            "client removed"
        ),
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: TcpConnection,
    state: Arc<ServerState<A, C>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ParleyError>
where
    A: Authenticator,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let registry = Arc::clone(state.engine.registry());

    // --- Step 1: Registration ---
    let (tx, rx) = mpsc::channel(state.outbound_queue);
    if let Err(e) = registry.add_client(conn_id, tx.clone()).await {
        tracing::warn!(%conn_id, error = %e, "connection refused");
        let _ = conn.close().await;
        return Err(e.into());
    }
    let guard = ClientGuard::new(conn_id, Arc::clone(&registry));

    // --- Step 2: Writer ---
    let (failed_tx, mut writer_failed) = oneshot::channel();
    let mut writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        Arc::clone(&state),
        rx,
        failed_tx,
    ));

    // --- Step 3: Read loop ---
    let mut result = Ok(());
    loop {
        tokio::select! {
            frame = conn.recv() => match frame {
                Ok(Some(frame)) => {
                    if handle_frame(conn_id, &state, &tx, &frame).await {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!(%conn_id, "peer closed connection");
                    break;
                }
                Err(TransportError::FrameTooLong { limit }) => {
                    tracing::warn!(%conn_id, limit, "dropping oversized frame");
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    result = Err(e.into());
                    break;
                }
            },
            _ = &mut writer_failed => {
                tracing::debug!(%conn_id, "writer failed, closing");
                break;
            }
            _ = shutdown.changed() => {
                tracing::debug!(%conn_id, "server shutting down");
                break;
            }
        }
    }

    // --- Step 4: Teardown ---
    guard.finish().await;
    drop(tx);
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(%conn_id, error = %e, "writer task failed"),
        Err(_) => {
            tracing::warn!(%conn_id, "peer is not reading, dropping unsent frames");
            writer.abort();
            let _ = writer.await;
        }
    }
    let _ = conn.close().await;
    tracing::info!(%conn_id, "disconnected");

    result
}

/// Decodes and dispatches one frame. Returns `true` if the connection
/// should close.
async fn handle_frame<A, C>(
    conn_id: ConnectionId,
    state: &ServerState<A, C>,
    tx: &mpsc::Sender<Message>,
    frame: &[u8],
) -> bool
where
    A: Authenticator,
    C: Codec,
{
    let msg = match state.codec.decode(frame) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "malformed frame");
            return false;
        }
    };
    tracing::debug!(%conn_id, kind = %msg.kind(), size = msg.size(), "frame received");

    let outcome = state.engine.dispatch(conn_id, msg).await;

    if let Some(reply) = outcome.reply {
        match tx.try_send(reply) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%conn_id, "outbound queue full, closing");
                return true;
            }
            Err(TrySendError::Closed(_)) => return true,
        }
    }
    if let Some(broadcast) = outcome.broadcast {
        state
            .engine
            .registry()
            .broadcast(&broadcast.scope, conn_id, &broadcast.message)
            .await;
    }
    outcome.close
}

/// Drains the outbound queue to the socket until every sender is gone.
///
/// Signals `failed` if a write fails, so the read loop stops too.
async fn write_loop<A, C>(
    conn: Arc<TcpConnection>,
    state: Arc<ServerState<A, C>>,
    mut rx: mpsc::Receiver<Message>,
    failed: oneshot::Sender<()>,
) where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    while let Some(msg) = rx.recv().await {
        let frame = match state.codec.encode(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode message");
                continue;
            }
        };
        if let Err(e) = conn.send(&frame).await {
            tracing::debug!(%conn_id, error = %e, "send failed");
            let _ = failed.send(());
            return;
        }
    }
}

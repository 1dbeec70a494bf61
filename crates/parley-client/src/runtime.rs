//! The client event loop.
//!
//! One task reads commands and drives [`ClientState`]. While connected, a
//! second task reads frames from the server and forwards them over a
//! channel, so input and network traffic are handled as they arrive.

use std::sync::Arc;

use parley_protocol::{Codec, Message, TextCodec};
use parley_transport::{Connection, TcpConnection, TransportError, DEFAULT_MAX_FRAME_LEN};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::Command;
use crate::state::{Action, ClientState, Notice};
use crate::ClientError;

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Longest frame accepted from the server, terminator included.
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// What the receive task reports, tagged with the link generation.
enum Inbound {
    Frame(Message),
    Closed,
}

/// An open connection and the task reading from it.
///
/// Every connect gets a new generation so that events still queued from
/// an older connection can be told apart and dropped.
struct Link {
    conn: Arc<TcpConnection>,
    generation: u64,
    receiver: JoinHandle<()>,
}

impl Link {
    async fn send(&self, msg: &Message) -> Result<(), TransportError> {
        let frame = TextCodec.encode(msg).map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.conn.send(&frame).await
    }

    /// Sends `last` if given, then closes the connection.
    async fn shut(self, last: Option<Message>) {
        if let Some(msg) = last {
            if let Err(e) = self.send(&msg).await {
                tracing::debug!(error = %e, "failed to send final message");
            }
        }
        if let Err(e) = self.conn.close().await {
            tracing::debug!(error = %e, "close failed");
        }
        self.receiver.abort();
        tracing::debug!(generation = self.generation, "link closed");
    }
}

/// Runs the interactive client until `/quit` or end of input.
///
/// Commands are read line by line from `input`; everything meant for the
/// user is written to `output`, one line per notice.
///
/// # Errors
/// Only I/O errors on `input` or `output` end the loop with an error.
pub async fn run<R, W>(input: R, mut output: W, config: ClientConfig) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<(u64, Inbound)>();
    let mut state = ClientState::new();
    let mut link: Option<Link> = None;
    let mut generation = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.map_err(ClientError::Input)? else {
                    tracing::debug!("end of input");
                    if let Ok(Action::Quit(exit)) = state.request(Command::Quit) {
                        if let Some(link) = link.take() {
                            link.shut(exit).await;
                        }
                    }
                    break;
                };

                let command = match Command::parse(line.trim_end_matches('\r')) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        write_line(&mut output, &Notice::Warning(e.to_string())).await?;
                        continue;
                    }
                };

                let action = match state.request(command) {
                    Ok(action) => action,
                    Err(notice) => {
                        write_line(&mut output, &notice).await?;
                        continue;
                    }
                };

                match action {
                    Action::Connect { addr, login } => {
                        generation += 1;
                        match open_link(&addr, &config, generation, &inbound_tx, &login).await {
                            Ok(opened) => link = Some(opened),
                            Err(e) => {
                                tracing::debug!(%addr, error = %e, "connect failed");
                                state.reset();
                                let notice = Notice::Warning("Connection failed.".into());
                                write_line(&mut output, &notice).await?;
                            }
                        }
                    }
                    Action::Send(msg) => {
                        let Some(open) = &link else {
                            continue;
                        };
                        let sent = open.send(&msg).await;
                        if let Err(e) = sent {
                            tracing::debug!(error = %e, "send failed");
                            if let Some(lost) = link.take() {
                                lost.shut(None).await;
                            }
                            if let Some(notice) = state.on_disconnect() {
                                write_line(&mut output, &notice).await?;
                            }
                        }
                    }
                    Action::Logout(exit) => {
                        if let Some(link) = link.take() {
                            link.shut(Some(exit)).await;
                        }
                    }
                    Action::Quit(exit) => {
                        if let Some(link) = link.take() {
                            link.shut(exit).await;
                        }
                        break;
                    }
                }
            }
            Some((from, inbound)) = inbound_rx.recv() => {
                if link.as_ref().map(|l| l.generation) != Some(from) {
                    tracing::trace!(generation = from, "dropping event from old connection");
                    continue;
                }
                match inbound {
                    Inbound::Frame(msg) => {
                        if let Some(notice) = state.on_frame(&msg) {
                            write_line(&mut output, &notice).await?;
                        }
                        if !state.is_connected() {
                            if let Some(link) = link.take() {
                                link.shut(None).await;
                            }
                        }
                    }
                    Inbound::Closed => {
                        if let Some(link) = link.take() {
                            link.shut(None).await;
                        }
                        if let Some(notice) = state.on_disconnect() {
                            write_line(&mut output, &notice).await?;
                        }
                    }
                }
            }
        }
    }

    output.flush().await.map_err(ClientError::Output)
}

/// Connects, starts the receive task, and sends the login message.
async fn open_link(
    addr: &str,
    config: &ClientConfig,
    generation: u64,
    inbound: &mpsc::UnboundedSender<(u64, Inbound)>,
    login: &Message,
) -> Result<Link, TransportError> {
    let conn = Arc::new(TcpConnection::connect(addr, config.max_frame_len).await?);
    let receiver = tokio::spawn(receive_loop(
        Arc::clone(&conn),
        generation,
        inbound.clone(),
    ));
    let link = Link {
        conn,
        generation,
        receiver,
    };
    let sent = link.send(login).await;
    if let Err(e) = sent {
        link.shut(None).await;
        return Err(e);
    }
    tracing::debug!(%addr, generation, "login sent");
    Ok(link)
}

/// Forwards decoded frames until the server closes the connection.
async fn receive_loop(
    conn: Arc<TcpConnection>,
    generation: u64,
    inbound: mpsc::UnboundedSender<(u64, Inbound)>,
) {
    loop {
        match conn.recv().await {
            Ok(Some(frame)) => match TextCodec.decode(&frame) {
                Ok(msg) => {
                    if inbound.send((generation, Inbound::Frame(msg))).is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "dropping malformed frame from server"),
            },
            Ok(None) => break,
            Err(TransportError::FrameTooLong { limit }) => {
                tracing::warn!(limit, "dropping oversized frame from server");
            }
            Err(e) => {
                tracing::debug!(error = %e, "receive failed");
                break;
            }
        }
    }
    let _ = inbound.send((generation, Inbound::Closed));
}

async fn write_line<W, T>(output: &mut W, line: &T) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
    T: std::fmt::Display + ?Sized,
{
    let text = format!("{line}\n");
    output
        .write_all(text.as_bytes())
        .await
        .map_err(ClientError::Output)?;
    output.flush().await.map_err(ClientError::Output)
}

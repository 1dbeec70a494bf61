//! The client's session state machine.
//!
//! ```text
//!             /login            LOGIN_ACK
//! Anonymous ─────────► Authenticating ─────────► Authenticated
//!     ▲                      │                  (no session ⇄ in session)
//!     └──── LOGIN_NAK ───────┘                        │
//!     └──────────── /logout, /quit, disconnect ───────┘
//! ```
//!
//! The state only changes in [`ClientState::request`] (a local command) or
//! [`ClientState::on_frame`] (a message from the server). It does no I/O;
//! it tells the runtime what to send through [`Action`] and what to show
//! through [`Notice`].

use std::fmt;

use parley_protocol::{Message, MessageType};

use crate::Command;

/// Where the client is in the login lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not connected.
    Anonymous,
    /// Connected, `LOGIN` sent, waiting for the verdict.
    Authenticating,
    /// Logged in.
    Authenticated,
}

/// What the runtime must do for an accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a connection to `addr` and send `login` on it.
    Connect { addr: String, login: Message },
    /// Send a message on the open connection.
    Send(Message),
    /// Send `EXIT`, then close the connection.
    Logout(Message),
    /// Send `EXIT` if connected, close, and stop the client.
    Quit(Option<Message>),
}

/// A line to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Plain status text.
    Info(String),
    /// Rendered as `[warning]: <text>`.
    Warning(String),
    /// A chat line, rendered as `[<source>]: <text>`.
    Chat { source: String, text: String },
}

impl Notice {
    fn warning(text: impl Into<String>) -> Self {
        Self::Warning(text.into())
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info(text) => f.write_str(text),
            Self::Warning(text) => write!(f, "[warning]: {text}"),
            Self::Chat { source, text } => write!(f, "[{source}]: {text}"),
        }
    }
}

const MUST_LOGIN: &str = "You must login first.";
const NOT_IN_SESSION: &str = "Not join any session yet.";
const SESSION_CREATED: &str = "Session created";

/// Client-side view of the login and session state.
#[derive(Debug, Clone)]
pub struct ClientState {
    phase: Phase,
    user: Option<String>,
    current_session: Option<String>,
    pending_session: Option<String>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    /// A fresh, disconnected client.
    pub fn new() -> Self {
        Self {
            phase: Phase::Anonymous,
            user: None,
            current_session: None,
            pending_session: None,
        }
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// `true` unless the client is [`Phase::Anonymous`].
    pub fn is_connected(&self) -> bool {
        self.phase != Phase::Anonymous
    }

    /// The session the server confirmed we are in.
    pub fn current_session(&self) -> Option<&str> {
        self.current_session.as_deref()
    }

    /// The session we asked to join or create and have no answer for yet.
    pub fn pending_session(&self) -> Option<&str> {
        self.pending_session.as_deref()
    }

    /// Checks a command against the current state.
    ///
    /// On success the state is updated optimistically and the returned
    /// [`Action`] says what to send. On failure nothing changes and the
    /// [`Notice`] explains why.
    pub fn request(&mut self, command: Command) -> Result<Action, Notice> {
        match command {
            Command::Login {
                user,
                password,
                host,
                port,
            } => {
                if self.is_connected() {
                    return Err(Notice::warning("Already logged in."));
                }
                let login = Message::new(MessageType::Login, user.as_str(), password)
                    .map_err(|_| Notice::warning("Invalid client ID or password."))?;
                self.phase = Phase::Authenticating;
                self.user = Some(user);
                Ok(Action::Connect {
                    addr: format!("{host}:{port}"),
                    login,
                })
            }
            Command::Logout => {
                if !self.is_connected() {
                    return Err(Notice::warning("Not logged in."));
                }
                let exit = self.message(MessageType::Exit, "")?;
                self.reset();
                Ok(Action::Logout(exit))
            }
            Command::JoinSession(session) => {
                self.require_login()?;
                self.require_no_session(
                    "Already in a session. Leave current session before joining another.",
                )?;
                let join = self.message(MessageType::Join, &session)?;
                self.pending_session = Some(session);
                Ok(Action::Send(join))
            }
            Command::LeaveSession => {
                self.require_login()?;
                if self.current_session.is_none() {
                    return Err(Notice::warning(NOT_IN_SESSION));
                }
                let leave = self.message(MessageType::LeaveSession, "")?;
                self.current_session = None;
                Ok(Action::Send(leave))
            }
            Command::CreateSession(session) => {
                self.require_login()?;
                self.require_no_session("Leave current session to create a new one.")?;
                let create = self.message(MessageType::NewSession, &session)?;
                self.pending_session = Some(session);
                Ok(Action::Send(create))
            }
            Command::List => {
                self.require_login()?;
                Ok(Action::Send(self.message(MessageType::Query, "")?))
            }
            Command::Quit => {
                let exit = if self.is_connected() {
                    self.message(MessageType::Exit, "").ok()
                } else {
                    None
                };
                self.reset();
                Ok(Action::Quit(exit))
            }
            Command::Chat(text) => {
                self.require_login()?;
                if self.current_session.is_none() {
                    return Err(Notice::warning(NOT_IN_SESSION));
                }
                Ok(Action::Send(self.message(MessageType::Chat, &text)?))
            }
        }
    }

    /// Applies a message from the server and returns what to show, if
    /// anything.
    ///
    /// After a `LOGIN_NAK` the client is [`Phase::Anonymous`] again; the
    /// runtime checks [`is_connected`](Self::is_connected) and closes the
    /// connection.
    pub fn on_frame(&mut self, msg: &Message) -> Option<Notice> {
        match msg.kind() {
            MessageType::LoginAck => {
                if self.phase == Phase::Authenticating {
                    self.phase = Phase::Authenticated;
                }
                Some(Notice::Info(msg.data().to_string()))
            }
            MessageType::LoginNak => {
                self.reset();
                Some(Notice::warning(msg.data()))
            }
            MessageType::JoinAck => self.settle_pending(),
            MessageType::JoinNak => {
                self.pending_session = None;
                Some(Notice::warning(msg.data()))
            }
            MessageType::NewSessionAck => {
                if msg.data() == SESSION_CREATED {
                    self.settle_pending()
                } else {
                    self.pending_session = None;
                    Some(Notice::warning(msg.data()))
                }
            }
            MessageType::QueryAck => Some(Notice::Info(msg.data().to_string())),
            MessageType::Chat => Some(Notice::Chat {
                source: msg.source().to_string(),
                text: msg.data().to_string(),
            }),
            MessageType::LeaveSession | MessageType::Exit => None,
            MessageType::Login
            | MessageType::Join
            | MessageType::NewSession
            | MessageType::Query => {
                tracing::debug!(kind = %msg.kind(), "ignoring client-only message from server");
                None
            }
        }
    }

    /// The connection went away. Returns the notice to show if we thought
    /// we were connected.
    pub fn on_disconnect(&mut self) -> Option<Notice> {
        if !self.is_connected() {
            return None;
        }
        self.reset();
        Some(Notice::Info("Disconnected from server.".to_string()))
    }

    /// Forgets the connection without a notice.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn settle_pending(&mut self) -> Option<Notice> {
        let session = self.pending_session.take()?;
        let notice = Notice::Info(format!("Current session: {session}"));
        self.current_session = Some(session);
        Some(notice)
    }

    fn require_login(&self) -> Result<(), Notice> {
        if self.phase == Phase::Authenticated {
            Ok(())
        } else {
            Err(Notice::warning(MUST_LOGIN))
        }
    }

    fn require_no_session(&self, warning: &str) -> Result<(), Notice> {
        if self.current_session.is_some() {
            return Err(Notice::warning(warning));
        }
        if self.pending_session.is_some() {
            return Err(Notice::warning(
                "Still waiting for the answer to the last session request.",
            ));
        }
        Ok(())
    }

    fn message(&self, kind: MessageType, data: &str) -> Result<Message, Notice> {
        let user = self.user.as_deref().unwrap_or_default();
        Message::new(kind, user, data).map_err(|e| Notice::warning(format!("Cannot send: {e}.")))
    }
}

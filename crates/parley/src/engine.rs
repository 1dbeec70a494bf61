//! Protocol engine: what the server does with each decoded message.
//!
//! The engine is transport-agnostic. It takes a connection id and a
//! [`Message`], consults and updates the [`Registry`], and returns an
//! [`Outcome`] describing what to send where. The connection handler
//! performs the actual I/O.

use std::fmt::Write as _;
use std::sync::Arc;

use parley_auth::Authenticator;
use parley_protocol::{Message, MessageType, SessionId, MAX_SOURCE_LEN};
use parley_registry::{ClientInfo, Registry, RegistryError, RegistrySnapshot};
use parley_transport::ConnectionId;

/// A message to fan out to the other members of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    /// The session whose members receive it.
    pub scope: SessionId,
    /// The message, forwarded as received.
    pub message: Message,
}

/// What the handler should do after one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Sent back to the originating connection.
    pub reply: Option<Message>,
    /// Sent to every other member of a session.
    pub broadcast: Option<Broadcast>,
    /// Close the connection once the reply is flushed.
    pub close: bool,
}

impl Outcome {
    /// Nothing to send.
    pub fn none() -> Self {
        Self::default()
    }

    /// A server reply of the given type and text.
    pub fn reply(kind: MessageType, text: impl Into<String>) -> Self {
        Self {
            reply: Some(Message::server(kind, text)),
            ..Self::default()
        }
    }

    /// Forward `message` to the other members of `scope`.
    pub fn broadcast(scope: SessionId, message: Message) -> Self {
        Self {
            broadcast: Some(Broadcast { scope, message }),
            ..Self::default()
        }
    }
}

const NOT_LOGGED_IN: &str = "Not logged in";
const ALREADY_IN_SESSION: &str = "Already in a session";
const INVALID_SESSION_ID: &str = "Invalid session ID";

/// Dispatches client messages against the shared registry.
pub struct Engine<A> {
    registry: Arc<Registry>,
    auth: A,
}

impl<A: Authenticator> Engine<A> {
    /// Creates an engine over `registry`, checking logins with `auth`.
    pub fn new(registry: Arc<Registry>, auth: A) -> Self {
        Self { registry, auth }
    }

    /// The registry this engine mutates.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handles one message from `conn_id`.
    ///
    /// Every registry change is a single atomic registry operation, so the
    /// registry invariants hold whatever this returns.
    pub async fn dispatch(&self, conn_id: ConnectionId, msg: Message) -> Outcome {
        let Some(client) = self.registry.client(conn_id).await else {
            tracing::warn!(%conn_id, "message from unregistered connection");
            return Outcome::none();
        };

        match msg.kind() {
            MessageType::Login => self.login(&client, &msg).await,
            MessageType::Exit => self.exit(&client).await,
            MessageType::Join => self.join(&client, &msg).await,
            MessageType::NewSession => self.new_session(&client, &msg).await,
            MessageType::LeaveSession => self.leave_session(&client).await,
            MessageType::Chat => chat(&client, msg),
            MessageType::Query => self.query(&client).await,
            MessageType::LoginAck
            | MessageType::LoginNak
            | MessageType::JoinAck
            | MessageType::JoinNak
            | MessageType::NewSessionAck
            | MessageType::QueryAck => {
                tracing::warn!(%conn_id, kind = %msg.kind(), "ignoring server-only message type");
                Outcome::none()
            }
        }
    }

    async fn login(&self, client: &ClientInfo, msg: &Message) -> Outcome {
        let conn_id = client.conn_id;
        if client.user.is_some() {
            return Outcome::reply(MessageType::LoginNak, "Already logged in");
        }

        let user = match self.auth.authenticate(msg.source(), msg.data()).await {
            Ok(user) => user,
            Err(e) => {
                tracing::info!(%conn_id, user = msg.source(), error = %e, "login rejected");
                return Outcome::reply(MessageType::LoginNak, "Invalid credentials");
            }
        };

        match self.registry.login(conn_id, user.clone()).await {
            Ok(()) => {
                tracing::info!(%conn_id, %user, "logged in");
                Outcome::reply(MessageType::LoginAck, "Login successful")
            }
            Err(RegistryError::DuplicateIdentity(user)) => {
                tracing::info!(%conn_id, %user, "duplicate login rejected");
                Outcome::reply(
                    MessageType::LoginNak,
                    format!("User {user} is already logged in"),
                )
            }
            Err(RegistryError::AlreadyLoggedIn(_)) => {
                Outcome::reply(MessageType::LoginNak, "Already logged in")
            }
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "login failed");
                Outcome::none()
            }
        }
    }

    async fn exit(&self, client: &ClientInfo) -> Outcome {
        if client.session.is_some() {
            if let Ok(left) = self.registry.leave_session(client.conn_id).await {
                tracing::debug!(conn_id = %client.conn_id, session = %left.session, "left session on exit");
            }
        }
        Outcome {
            reply: Some(Message::server(MessageType::Exit, "")),
            close: true,
            ..Outcome::default()
        }
    }

    async fn join(&self, client: &ClientInfo, msg: &Message) -> Outcome {
        if client.user.is_none() {
            return Outcome::reply(MessageType::JoinNak, NOT_LOGGED_IN);
        }
        let Some(session) = session_id(msg.data()) else {
            return Outcome::reply(MessageType::JoinNak, INVALID_SESSION_ID);
        };

        match self.registry.join_session(client.conn_id, session.clone()).await {
            Ok(()) => {
                tracing::info!(conn_id = %client.conn_id, %session, "joined session");
                Outcome::reply(MessageType::JoinAck, "Joined session")
            }
            Err(RegistryError::SessionNotFound(_)) => {
                Outcome::reply(MessageType::JoinNak, "Session does not exist")
            }
            Err(RegistryError::AlreadyInSession(_)) => {
                Outcome::reply(MessageType::JoinNak, ALREADY_IN_SESSION)
            }
            Err(RegistryError::NotLoggedIn) => {
                Outcome::reply(MessageType::JoinNak, NOT_LOGGED_IN)
            }
            Err(e) => {
                tracing::warn!(conn_id = %client.conn_id, error = %e, "join failed");
                Outcome::none()
            }
        }
    }

    async fn new_session(&self, client: &ClientInfo, msg: &Message) -> Outcome {
        if client.user.is_none() {
            return Outcome::reply(MessageType::NewSessionAck, NOT_LOGGED_IN);
        }
        let Some(session) = session_id(msg.data()) else {
            return Outcome::reply(MessageType::NewSessionAck, INVALID_SESSION_ID);
        };

        let text = match self
            .registry
            .create_session_if_absent(client.conn_id, session)
            .await
        {
            Ok(()) => "Session created",
            Err(RegistryError::AlreadyInSession(_)) => ALREADY_IN_SESSION,
            Err(RegistryError::SessionExists(_)) => "Session already exists",
            Err(RegistryError::SessionLimit { max }) => {
                tracing::warn!(conn_id = %client.conn_id, max, "session limit reached");
                "Session limit reached"
            }
            Err(RegistryError::NotLoggedIn) => NOT_LOGGED_IN,
            Err(e) => {
                tracing::warn!(conn_id = %client.conn_id, error = %e, "create session failed");
                return Outcome::none();
            }
        };
        Outcome::reply(MessageType::NewSessionAck, text)
    }

    async fn leave_session(&self, client: &ClientInfo) -> Outcome {
        if client.user.is_none() {
            return Outcome::reply(MessageType::LeaveSession, NOT_LOGGED_IN);
        }

        match self.registry.leave_session(client.conn_id).await {
            Ok(left) => {
                tracing::info!(conn_id = %client.conn_id, session = %left.session, "left session");
                Outcome::reply(MessageType::LeaveSession, "Left session")
            }
            Err(_) => Outcome::reply(MessageType::LeaveSession, "Not in a session"),
        }
    }

    async fn query(&self, client: &ClientInfo) -> Outcome {
        if client.user.is_none() {
            return Outcome::reply(MessageType::QueryAck, NOT_LOGGED_IN);
        }
        let snapshot = self.registry.snapshot_all().await;
        Outcome::reply(MessageType::QueryAck, render_listing(&snapshot))
    }
}

/// Session ids follow the same length rule as client ids and may not be
/// empty.
fn session_id(data: &str) -> Option<SessionId> {
    if data.is_empty() || data.len() > MAX_SOURCE_LEN {
        return None;
    }
    Some(SessionId::new(data))
}

fn chat(client: &ClientInfo, msg: Message) -> Outcome {
    match (&client.user, &client.session) {
        (Some(_), Some(session)) => Outcome::broadcast(session.clone(), msg),
        _ => {
            tracing::debug!(conn_id = %client.conn_id, "dropping chat outside a session");
            Outcome::none()
        }
    }
}

/// Renders a snapshot as the `QUERY_ACK` text:
///
/// ```text
/// Clients: ken (session: room1), andy (session: none); Sessions: room1
/// ```
///
/// [`Message::server`] truncates the result if it is too long.
pub fn render_listing(snapshot: &RegistrySnapshot) -> String {
    let mut out = String::from("Clients: ");
    for (i, client) in snapshot.clients.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let name = client.user.as_ref().map_or("(anonymous)", |u| u.as_str());
        let session = client.session.as_ref().map_or("none", |s| s.as_str());
        let _ = write!(out, "{name} (session: {session})");
    }

    out.push_str("; Sessions: ");
    if snapshot.sessions.is_empty() {
        out.push_str("none");
    } else {
        let names: Vec<&str> =
            snapshot.sessions.iter().map(|s| s.id.as_str()).collect();
        out.push_str(&names.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use parley_auth::StaticAuthenticator;
    use parley_protocol::UserId;
    use parley_registry::RegistryLimits;
    use tokio::sync::mpsc;

    use super::*;

    fn engine() -> Engine<StaticAuthenticator> {
        Engine::new(
            Arc::new(Registry::new(RegistryLimits::default())),
            StaticAuthenticator::default(),
        )
    }

    async fn connect(engine: &Engine<StaticAuthenticator>, n: u64) -> ConnectionId {
        let conn_id = ConnectionId::new(n);
        let (tx, _rx) = mpsc::channel(8);
        engine.registry().add_client(conn_id, tx).await.unwrap();
        conn_id
    }

    fn msg(kind: MessageType, source: &str, data: &str) -> Message {
        Message::new(kind, source, data).unwrap()
    }

    async fn login(engine: &Engine<StaticAuthenticator>, conn_id: ConnectionId, user: &str) {
        let out = engine
            .dispatch(conn_id, msg(MessageType::Login, user, "12345"))
            .await;
        assert_eq!(out.reply.unwrap().kind(), MessageType::LoginAck);
    }

    fn reply_of(out: &Outcome) -> (MessageType, &str) {
        let reply = out.reply.as_ref().expect("expected a reply");
        assert_eq!(reply.source(), "server");
        (reply.kind(), reply.data())
    }

    // =====================================================================
    // LOGIN
    // =====================================================================

    #[tokio::test]
    async fn test_login_valid_credentials_ack() {
        let engine = engine();
        let ken = connect(&engine, 1).await;

        let out = engine.dispatch(ken, msg(MessageType::Login, "ken", "12345")).await;

        assert_eq!(reply_of(&out), (MessageType::LoginAck, "Login successful"));
        let client = engine.registry().client(ken).await.unwrap();
        assert_eq!(client.user, Some(UserId::new("ken")));
    }

    #[tokio::test]
    async fn test_login_bad_password_nak() {
        let engine = engine();
        let ken = connect(&engine, 1).await;

        let out = engine.dispatch(ken, msg(MessageType::Login, "ken", "nope")).await;

        assert_eq!(reply_of(&out), (MessageType::LoginNak, "Invalid credentials"));
        assert!(!out.close, "a failed login keeps the connection");
    }

    #[tokio::test]
    async fn test_login_duplicate_identity_nak() {
        let engine = engine();
        let first = connect(&engine, 1).await;
        let second = connect(&engine, 2).await;
        login(&engine, first, "ken").await;

        let out = engine.dispatch(second, msg(MessageType::Login, "ken", "12345")).await;

        assert_eq!(
            reply_of(&out),
            (MessageType::LoginNak, "User ken is already logged in")
        );
    }

    #[tokio::test]
    async fn test_login_twice_on_connection_nak() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;

        let out = engine.dispatch(ken, msg(MessageType::Login, "andy", "12345")).await;

        assert_eq!(reply_of(&out), (MessageType::LoginNak, "Already logged in"));
    }

    // =====================================================================
    // Pre-login requests
    // =====================================================================

    #[tokio::test]
    async fn test_requests_before_login_are_refused() {
        let engine = engine();
        let anon = connect(&engine, 1).await;

        let join = engine.dispatch(anon, msg(MessageType::Join, "x", "room1")).await;
        let create = engine.dispatch(anon, msg(MessageType::NewSession, "x", "room1")).await;
        let leave = engine.dispatch(anon, msg(MessageType::LeaveSession, "x", "")).await;
        let query = engine.dispatch(anon, msg(MessageType::Query, "x", "")).await;
        let chat = engine.dispatch(anon, msg(MessageType::Chat, "x", "hi")).await;

        assert_eq!(reply_of(&join), (MessageType::JoinNak, "Not logged in"));
        assert_eq!(reply_of(&create), (MessageType::NewSessionAck, "Not logged in"));
        assert_eq!(reply_of(&leave), (MessageType::LeaveSession, "Not logged in"));
        assert_eq!(reply_of(&query), (MessageType::QueryAck, "Not logged in"));
        assert_eq!(chat, Outcome::none());
        assert_eq!(engine.registry().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_only_types_are_ignored() {
        let engine = engine();
        let anon = connect(&engine, 1).await;

        let out = engine.dispatch(anon, msg(MessageType::LoginAck, "x", "")).await;

        assert_eq!(out, Outcome::none());
    }

    // =====================================================================
    // Sessions
    // =====================================================================

    #[tokio::test]
    async fn test_new_session_then_join() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        let andy = connect(&engine, 2).await;
        login(&engine, ken, "ken").await;
        login(&engine, andy, "andy").await;

        let created = engine.dispatch(ken, msg(MessageType::NewSession, "ken", "room1")).await;
        let joined = engine.dispatch(andy, msg(MessageType::Join, "andy", "room1")).await;

        assert_eq!(reply_of(&created), (MessageType::NewSessionAck, "Session created"));
        assert_eq!(reply_of(&joined), (MessageType::JoinAck, "Joined session"));
        let members = engine
            .registry()
            .find_clients_by_session(&SessionId::new("room1"))
            .await;
        assert_eq!(members, vec![ken, andy]);
    }

    #[tokio::test]
    async fn test_new_session_failures_keep_ack_type() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        let andy = connect(&engine, 2).await;
        login(&engine, ken, "ken").await;
        login(&engine, andy, "andy").await;
        engine.dispatch(ken, msg(MessageType::NewSession, "ken", "room1")).await;

        let again = engine.dispatch(ken, msg(MessageType::NewSession, "ken", "room2")).await;
        let taken = engine.dispatch(andy, msg(MessageType::NewSession, "andy", "room1")).await;

        assert_eq!(reply_of(&again), (MessageType::NewSessionAck, "Already in a session"));
        assert_eq!(reply_of(&taken), (MessageType::NewSessionAck, "Session already exists"));
    }

    #[tokio::test]
    async fn test_new_session_limit_reached() {
        let engine = Engine::new(
            Arc::new(Registry::new(RegistryLimits {
                max_clients: 4,
                max_sessions: 1,
            })),
            StaticAuthenticator::default(),
        );
        let ken = connect(&engine, 1).await;
        let andy = connect(&engine, 2).await;
        login(&engine, ken, "ken").await;
        login(&engine, andy, "andy").await;
        engine.dispatch(ken, msg(MessageType::NewSession, "ken", "a")).await;

        let out = engine.dispatch(andy, msg(MessageType::NewSession, "andy", "b")).await;

        assert_eq!(reply_of(&out), (MessageType::NewSessionAck, "Session limit reached"));
    }

    #[tokio::test]
    async fn test_session_id_empty_or_too_long_refused() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;
        let long = "r".repeat(MAX_SOURCE_LEN + 1);

        let empty_create = engine.dispatch(ken, msg(MessageType::NewSession, "ken", "")).await;
        let long_create = engine.dispatch(ken, msg(MessageType::NewSession, "ken", &long)).await;
        let empty_join = engine.dispatch(ken, msg(MessageType::Join, "ken", "")).await;
        let long_join = engine.dispatch(ken, msg(MessageType::Join, "ken", &long)).await;

        assert_eq!(reply_of(&empty_create), (MessageType::NewSessionAck, "Invalid session ID"));
        assert_eq!(reply_of(&long_create), (MessageType::NewSessionAck, "Invalid session ID"));
        assert_eq!(reply_of(&empty_join), (MessageType::JoinNak, "Invalid session ID"));
        assert_eq!(reply_of(&long_join), (MessageType::JoinNak, "Invalid session ID"));
        assert_eq!(engine.registry().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_id_at_length_limit_accepted() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;
        let name = "r".repeat(MAX_SOURCE_LEN);

        let out = engine.dispatch(ken, msg(MessageType::NewSession, "ken", &name)).await;

        assert_eq!(reply_of(&out), (MessageType::NewSessionAck, "Session created"));
    }

    #[tokio::test]
    async fn test_join_missing_session_checked_first() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;
        engine.dispatch(ken, msg(MessageType::NewSession, "ken", "room1")).await;

        let missing = engine.dispatch(ken, msg(MessageType::Join, "ken", "room9")).await;
        let busy = engine.dispatch(ken, msg(MessageType::Join, "ken", "room1")).await;

        assert_eq!(reply_of(&missing), (MessageType::JoinNak, "Session does not exist"));
        assert_eq!(reply_of(&busy), (MessageType::JoinNak, "Already in a session"));
    }

    #[tokio::test]
    async fn test_leave_session_replies_and_removes_empty_session() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;

        let not_in = engine.dispatch(ken, msg(MessageType::LeaveSession, "ken", "")).await;
        engine.dispatch(ken, msg(MessageType::NewSession, "ken", "room1")).await;
        let left = engine.dispatch(ken, msg(MessageType::LeaveSession, "ken", "")).await;

        assert_eq!(reply_of(&not_in), (MessageType::LeaveSession, "Not in a session"));
        assert_eq!(reply_of(&left), (MessageType::LeaveSession, "Left session"));
        assert!(engine.registry().find_session(&SessionId::new("room1")).await.is_none());
    }

    // =====================================================================
    // EXIT / CHAT
    // =====================================================================

    #[tokio::test]
    async fn test_exit_leaves_session_and_closes() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;
        engine.dispatch(ken, msg(MessageType::NewSession, "ken", "room1")).await;

        let out = engine.dispatch(ken, msg(MessageType::Exit, "ken", "")).await;

        assert_eq!(reply_of(&out), (MessageType::Exit, ""));
        assert!(out.close);
        assert_eq!(engine.registry().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_chat_in_session_broadcasts_verbatim() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;
        engine.dispatch(ken, msg(MessageType::NewSession, "ken", "room1")).await;
        let line = msg(MessageType::Chat, "ken", "hi: there");

        let out = engine.dispatch(ken, line.clone()).await;

        assert!(out.reply.is_none());
        assert_eq!(
            out.broadcast,
            Some(Broadcast {
                scope: SessionId::new("room1"),
                message: line
            })
        );
    }

    #[tokio::test]
    async fn test_chat_outside_session_dropped() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;

        let out = engine.dispatch(ken, msg(MessageType::Chat, "ken", "hi")).await;

        assert_eq!(out, Outcome::none());
    }

    // =====================================================================
    // QUERY
    // =====================================================================

    #[tokio::test]
    async fn test_query_lists_clients_and_sessions() {
        let engine = engine();
        let ken = connect(&engine, 1).await;
        let andy = connect(&engine, 2).await;
        connect(&engine, 3).await;
        login(&engine, ken, "ken").await;
        login(&engine, andy, "andy").await;
        engine.dispatch(ken, msg(MessageType::NewSession, "ken", "room1")).await;

        let out = engine.dispatch(andy, msg(MessageType::Query, "andy", "")).await;

        assert_eq!(
            reply_of(&out),
            (
                MessageType::QueryAck,
                "Clients: ken (session: room1), andy (session: none), \
                 (anonymous) (session: none); Sessions: room1"
            )
        );
    }

    #[test]
    fn test_render_listing_without_sessions() {
        let snapshot = RegistrySnapshot {
            clients: vec![ClientInfo {
                conn_id: ConnectionId::new(1),
                user: Some(UserId::new("ken")),
                session: None,
            }],
            sessions: vec![],
        };

        assert_eq!(
            render_listing(&snapshot),
            "Clients: ken (session: none); Sessions: none"
        );
    }

    #[tokio::test]
    async fn test_query_truncated_to_data_limit() {
        let engine = Engine::new(
            Arc::new(Registry::default()),
            StaticAuthenticator::default(),
        );
        let ken = connect(&engine, 1).await;
        login(&engine, ken, "ken").await;
        for n in 2..200 {
            connect(&engine, n).await;
        }

        let out = engine.dispatch(ken, msg(MessageType::Query, "ken", "")).await;

        let reply = out.reply.unwrap();
        assert!(reply.data().len() <= parley_protocol::MAX_DATA_LEN);
        assert!(reply.data().starts_with("Clients: ken (session: none)"));
    }
}

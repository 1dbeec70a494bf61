//! Core protocol types for Parley's wire format.
//!
//! Every frame on the wire carries exactly one [`Message`]: a type tag, the
//! byte length of the payload, the name of whoever sent it, and the payload
//! itself. The same struct is used in both directions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Longest allowed `source` field, in bytes.
pub const MAX_SOURCE_LEN: usize = 49;

/// Longest allowed `data` field, in bytes.
pub const MAX_DATA_LEN: usize = 1023;

/// Length of the largest legal frame: `13:1023:<49 bytes>:<1023 bytes>\n`.
///
/// A configured frame limit below this would reject valid messages.
pub const MAX_ENCODED_LEN: usize = 2 + 1 + 4 + 1 + MAX_SOURCE_LEN + 1 + MAX_DATA_LEN + 1;

/// The `source` the server puts on every message it originates.
pub const SERVER_SOURCE: &str = "server";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The login name of a user (`ken`, `andy`, ...).
///
/// A newtype so a user name can't be passed where a session name is
/// expected, even though both are strings underneath.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a user name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The name of a chat session (room). Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a session name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// The closed set of message types.
///
/// The discriminants are the numbers that appear in the `type` field on the
/// wire, so they must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Client → Server: `source` is the user name, `data` the password.
    Login = 1,
    /// Server → Client: login accepted.
    LoginAck = 2,
    /// Server → Client: login refused, `data` holds the reason.
    LoginNak = 3,
    /// Either direction: the client is leaving; the server confirms.
    Exit = 4,
    /// Client → Server: join the session named in `data`.
    Join = 5,
    /// Server → Client: join accepted.
    JoinAck = 6,
    /// Server → Client: join refused, `data` holds the reason.
    JoinNak = 7,
    /// Client → Server: leave the current session. Also the reply type.
    LeaveSession = 8,
    /// Client → Server: create and join the session named in `data`.
    NewSession = 9,
    /// Server → Client: outcome of `NewSession`. Success and failure share
    /// this type; only `data` tells them apart.
    NewSessionAck = 10,
    /// Either direction: a chat line for the sender's current session.
    Chat = 11,
    /// Client → Server: list users and sessions.
    Query = 12,
    /// Server → Client: the listing, as text in `data`.
    QueryAck = 13,
}

impl MessageType {
    /// Every message type, in wire order.
    pub const ALL: [MessageType; 13] = [
        Self::Login,
        Self::LoginAck,
        Self::LoginNak,
        Self::Exit,
        Self::Join,
        Self::JoinAck,
        Self::JoinNak,
        Self::LeaveSession,
        Self::NewSession,
        Self::NewSessionAck,
        Self::Chat,
        Self::Query,
        Self::QueryAck,
    ];

    /// The number written in the `type` field.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up a message type by its wire number.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "LOGIN",
            Self::LoginAck => "LOGIN_ACK",
            Self::LoginNak => "LOGIN_NAK",
            Self::Exit => "EXIT",
            Self::Join => "JOIN",
            Self::JoinAck => "JOIN_ACK",
            Self::JoinNak => "JOIN_NAK",
            Self::LeaveSession => "LEAVE_SESSION",
            Self::NewSession => "NEW_SESSION",
            Self::NewSessionAck => "NEW_SESSION_ACK",
            Self::Chat => "CHAT",
            Self::Query => "QUERY",
            Self::QueryAck => "QUERY_ACK",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One protocol message, the unit of transmission in both directions.
///
/// A `Message` can only be built through a validating constructor, so any
/// value you hold satisfies the wire rules:
///
/// - `size` equals the byte length of `data`
/// - `source` is at most [`MAX_SOURCE_LEN`] bytes and contains neither
///   `:` nor `\n`
/// - `data` is at most [`MAX_DATA_LEN`] bytes and contains no `\n`
///   (`:` is allowed; the decoder only splits on the first three)
///
/// The fields are private and there are no setters: a message is immutable
/// once constructed.
///
/// With the `json` feature the serde representation is
/// `{"type":"CHAT","size":2,"source":"ken","data":"hi"}`, and deserializing
/// re-runs the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    #[serde(rename = "type")]
    kind: MessageType,
    size: u32,
    source: String,
    data: String,
}

/// Unvalidated serde mirror of [`Message`].
#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: MessageType,
    size: u32,
    source: String,
    data: String,
}

impl TryFrom<RawMessage> for Message {
    type Error = ProtocolError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        Message::from_parts(raw.kind, raw.size, raw.source, raw.data)
    }
}

impl Message {
    /// Builds a message, computing `size` from `data`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::FieldTooLong`] or
    /// [`ProtocolError::ForbiddenCharacter`] if a field breaks the wire rules.
    pub fn new(
        kind: MessageType,
        source: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let data = data.into();
        let size = data.len() as u32;
        Self::from_parts(kind, size, source, data)
    }

    /// Builds a message from decoded header values, checking that the
    /// declared `size` matches `data`.
    pub fn from_parts(
        kind: MessageType,
        size: u32,
        source: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let source = source.into();
        let data = data.into();

        check_field("source", &source, MAX_SOURCE_LEN, &[':', '\n'])?;
        check_field("data", &data, MAX_DATA_LEN, &['\n'])?;
        if size as usize != data.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: size,
                actual: data.len(),
            });
        }

        Ok(Self {
            kind,
            size,
            source,
            data,
        })
    }

    /// Builds a server-originated message with [`SERVER_SOURCE`].
    ///
    /// Server text is generated, not user input, so instead of failing this
    /// folds line breaks into spaces and truncates to [`MAX_DATA_LEN`] on a
    /// character boundary.
    pub fn server(kind: MessageType, text: impl Into<String>) -> Self {
        let mut data = text.into().replace('\n', " ");
        if data.len() > MAX_DATA_LEN {
            let mut cut = MAX_DATA_LEN;
            while !data.is_char_boundary(cut) {
                cut -= 1;
            }
            data.truncate(cut);
        }
        Self {
            kind,
            size: data.len() as u32,
            source: SERVER_SOURCE.to_string(),
            data,
        }
    }

    /// The message type.
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// The byte length of [`data`](Self::data).
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Who sent the message: a user name, or `server`.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The payload: password, session name, chat text, or reply text
    /// depending on the type.
    pub fn data(&self) -> &str {
        &self.data
    }
}

fn check_field(
    field: &'static str,
    value: &str,
    max: usize,
    forbidden: &[char],
) -> Result<(), ProtocolError> {
    if value.len() > max {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    if let Some(ch) = value.chars().find(|c| forbidden.contains(c)) {
        return Err(ProtocolError::ForbiddenCharacter { field, ch });
    }
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================

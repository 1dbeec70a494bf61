//! Codec trait and implementations for turning messages into frames.
//!
//! A frame is one line of bytes ending in `\n`. The transport hands us
//! exactly one frame per read; a codec only has to deal with what is
//! between the start of the line and its terminator.
//!
//! [`TextCodec`] is the format every Parley peer speaks by default:
//!
//! ```text
//! <type>:<size>:<source>:<data>\n
//! ```
//!
//! [`JsonCodec`] carries the same [`Message`] as a JSON object per line,
//! which is easier to read in a packet capture.

use crate::{Message, MessageType, ProtocolError};

/// Converts [`Message`]s to frames and back.
///
/// `Send + Sync + 'static` so one codec instance can be shared by every
/// connection task on the runtime.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a message into a complete frame, terminator included.
    ///
    /// # Errors
    /// Only formats that can fail to serialize return an error; the text
    /// format never does, since a `Message` is valid by construction.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Parses one frame back into a message.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] describing the first rule the frame
    /// breaks. The caller decides whether to drop the frame or the peer.
    fn decode(&self, frame: &[u8]) -> Result<Message, ProtocolError>;
}

// ---------------------------------------------------------------------------
// TextCodec
// ---------------------------------------------------------------------------

/// The colon-delimited line format.
///
/// Decoding splits on the first three `:` only, so chat text may contain
/// colons. Nothing is escaped: `source` may not contain `:` and no field may
/// contain `\n`, which [`Message`]'s constructors already guarantee.
///
/// ```rust
/// use parley_protocol::{Codec, Message, MessageType, TextCodec};
///
/// let codec = TextCodec;
/// let msg = Message::new(MessageType::Chat, "ken", "hi: all").unwrap();
///
/// let frame = codec.encode(&msg).unwrap();
/// assert_eq!(frame, b"11:7:ken:hi: all\n");
///
/// let decoded = codec.decode(&frame).unwrap();
/// assert_eq!(decoded, msg);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let line = format!(
            "{}:{}:{}:{}\n",
            message.kind().code(),
            message.size(),
            message.source(),
            message.data()
        );
        Ok(line.into_bytes())
    }

    fn decode(&self, frame: &[u8]) -> Result<Message, ProtocolError> {
        let line = frame
            .strip_suffix(b"\n")
            .ok_or(ProtocolError::MissingTerminator)?;
        let line =
            std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;

        let mut fields = line.splitn(4, ':');
        let (Some(kind), Some(size), Some(source), Some(data)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ProtocolError::MissingDelimiter);
        };

        let code = parse_decimal("type", kind)?;
        let kind = MessageType::from_code(code)
            .ok_or(ProtocolError::UnknownType(code))?;
        let size = parse_decimal("size", size)?;

        Message::from_parts(kind, size, source, data)
    }
}

/// Parses a canonical decimal `u32`: ASCII digits only, no sign, no
/// leading zeros except for `0` itself.
fn parse_decimal(field: &'static str, text: &str) -> Result<u32, ProtocolError> {
    let invalid = || ProtocolError::InvalidNumber {
        field,
        value: text.to_string(),
    };

    let canonical = !text.is_empty()
        && text.bytes().all(|b| b.is_ascii_digit())
        && (text == "0" || !text.starts_with('0'));
    if !canonical {
        return Err(invalid());
    }
    text.parse().map_err(|_| invalid())
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that writes each message as a single JSON line.
///
/// `serde_json` never emits a raw newline inside a value, so the one at the
/// end stays the only terminator. Decoding runs the same validation as the
/// text format.
///
/// This is behind the `json` feature flag (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let mut frame =
            serde_json::to_vec(message).map_err(ProtocolError::Encode)?;
        frame.push(b'\n');
        Ok(frame)
    }

    fn decode(&self, frame: &[u8]) -> Result<Message, ProtocolError> {
        let line = frame
            .strip_suffix(b"\n")
            .ok_or(ProtocolError::MissingTerminator)?;
        serde_json::from_slice(line).map_err(ProtocolError::Decode)
    }
}

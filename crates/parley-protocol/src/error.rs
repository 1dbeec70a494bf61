//! Error types for the protocol layer.
//!
//! Every variant describes a frame or field that cannot be turned into a
//! valid [`Message`](crate::Message). The server logs these and keeps
//! reading; they never close a connection on their own.

/// Errors that can occur while building, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame does not end with the `\n` terminator.
    #[error("frame is not terminated by a line break")]
    MissingTerminator,

    /// Fewer than the three `:` delimiters a frame needs.
    #[error("frame has fewer than four ':'-separated fields")]
    MissingDelimiter,

    /// The frame is not valid UTF-8 text.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// A numeric header field is not a canonical decimal `u32`.
    #[error("{field} field is not a decimal number: {value:?}")]
    InvalidNumber {
        /// Which header field (`type` or `size`).
        field: &'static str,
        /// The text that failed to parse.
        value: String,
    },

    /// The `type` field names no known message type.
    #[error("unknown message type {0}")]
    UnknownType(u32),

    /// The declared `size` disagrees with the byte length of `data`.
    #[error("size field says {declared} bytes but data has {actual}")]
    SizeMismatch {
        /// The value of the `size` header.
        declared: u32,
        /// The actual byte length of `data`.
        actual: usize,
    },

    /// A text field is longer than the protocol allows.
    #[error("{field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        /// Which field (`source` or `data`).
        field: &'static str,
        /// Its length in bytes.
        len: usize,
        /// The protocol limit in bytes.
        max: usize,
    },

    /// A text field contains a delimiter it may not carry.
    #[error("{field} must not contain {ch:?}")]
    ForbiddenCharacter {
        /// Which field (`source` or `data`).
        field: &'static str,
        /// The offending character.
        ch: char,
    },

    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// JSON deserialization failed, including messages whose fields
    /// violate the limits above.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}

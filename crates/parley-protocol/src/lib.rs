//! Wire protocol for Parley.
//!
//! This crate defines what clients and servers say to each other:
//!
//! - **Types** ([`Message`], [`MessageType`], [`UserId`], [`SessionId`]):
//!   the single message shape used in both directions, plus the
//!   identifiers the rest of the system passes around.
//! - **Codec** ([`Codec`] trait, [`TextCodec`], [`JsonCodec`]): how a
//!   message becomes one `\n`-terminated frame and back.
//! - **Errors** ([`ProtocolError`]): why a frame or field was rejected.
//!
//! The protocol layer knows nothing about sockets or sessions. It sits
//! between the transport, which hands it lines, and the server engine,
//! which acts on decoded messages.
//!
//! ```text
//! Transport (lines) → Protocol (Message) → Engine (registry + auth)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, TextCodec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    MAX_DATA_LEN, MAX_ENCODED_LEN, MAX_SOURCE_LEN, Message, MessageType,
    SERVER_SOURCE, SessionId, UserId,
};

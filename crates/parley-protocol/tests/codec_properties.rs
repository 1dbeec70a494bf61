//! Property tests for the line codecs.

use parley_protocol::{
    Codec, MAX_DATA_LEN, MAX_ENCODED_LEN, MAX_SOURCE_LEN, Message, MessageType,
    TextCodec,
};
use proptest::prelude::*;

fn any_kind() -> impl Strategy<Value = MessageType> {
    proptest::sample::select(MessageType::ALL.to_vec())
}

/// Sources: printable text without `:` that fits the limit.
fn any_source() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_ .!é-]{0,20}"
        .prop_filter("fits source limit", |s| s.len() <= MAX_SOURCE_LEN)
}

/// Data: anything but `\n`, colons included.
fn any_data() -> impl Strategy<Value = String> {
    "[^\n]{0,200}".prop_filter("fits data limit", |s| s.len() <= MAX_DATA_LEN)
}

fn any_message() -> impl Strategy<Value = Message> {
    (any_kind(), any_source(), any_data()).prop_map(|(kind, source, data)| {
        Message::new(kind, source, data).expect("strategy yields valid fields")
    })
}

proptest! {
    #[test]
    fn prop_text_decode_inverts_encode(msg in any_message()) {
        let frame = TextCodec.encode(&msg).unwrap();
        let decoded = TextCodec.decode(&frame).unwrap();
        prop_assert_eq!(TextCodec.encode(&decoded).unwrap(), frame);
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn prop_text_frames_are_single_bounded_lines(msg in any_message()) {
        let frame = TextCodec.encode(&msg).unwrap();
        prop_assert!(frame.len() <= MAX_ENCODED_LEN);
        prop_assert_eq!(frame.iter().filter(|b| **b == b'\n').count(), 1);
        prop_assert_eq!(frame.last(), Some(&b'\n'));
    }

    #[test]
    fn prop_text_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = TextCodec.decode(&bytes);
    }

    #[test]
    fn prop_text_decode_rejects_wrong_size(
        msg in any_message(),
        delta in 1u32..5,
    ) {
        let frame = format!(
            "{}:{}:{}:{}\n",
            msg.kind().code(),
            msg.size() + delta,
            msg.source(),
            msg.data()
        );
        prop_assert!(TextCodec.decode(frame.as_bytes()).is_err());
    }
}

#[cfg(feature = "json")]
proptest! {
    #[test]
    fn prop_json_decode_inverts_encode(msg in any_message()) {
        let codec = parley_protocol::JsonCodec;
        let frame = codec.encode(&msg).unwrap();
        let decoded = codec.decode(&frame).unwrap();
        prop_assert_eq!(decoded, msg);
    }
}

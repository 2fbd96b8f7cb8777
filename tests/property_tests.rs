//! Property-based tests using proptest
//!
//! These tests validate codec invariants across a wide range of randomly
//! generated inputs: values survive encoding, hostile bytes never panic the
//! decoders, and the stream decoder does not care how bytes are chunked.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use multiuser_server::core::codec::{FrameCodec, MessageCodec};
use multiuser_server::core::packet::Frame;
use multiuser_server::core::proplist::PropList;
use multiuser_server::core::value::Value;
use multiuser_server::protocol::message::Message;
use multiuser_server::utils::crypto::FrameCipher;
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

fn text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 #@._-]{0,24}"
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Void),
        any::<i32>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        text().prop_map(Value::Symbol),
        text().prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Picture),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Media),
    ]
}

fn geometry() -> impl Strategy<Value = Value> {
    prop_oneof![
        (any::<i32>(), any::<i32>()).prop_map(|(x, y)| Value::Point { x, y }),
        (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>()).prop_map(
            |(left, top, right, bottom)| Value::Rect {
                left,
                top,
                right,
                bottom
            }
        ),
        (any::<u8>(), any::<u8>(), any::<u8>())
            .prop_map(|(red, green, blue)| Value::Color { red, green, blue }),
        any::<[u8; 8]>().prop_map(Value::Date),
        prop::array::uniform3(-1.0e6f32..1.0e6).prop_map(Value::Vector3),
        prop::array::uniform16(-1.0e6f32..1.0e6).prop_map(|m| Value::Transform3(Box::new(m))),
    ]
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![scalar(), geometry()]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::vec((text(), inner), 0..6).prop_map(|pairs| {
                let mut list = PropList::new();
                for (key, value) in pairs {
                    list.push(Value::Symbol(key), value);
                }
                Value::PropList(list)
            }),
        ]
    })
}

fn message() -> impl Strategy<Value = Message> {
    (
        any::<i32>(),
        any::<i32>(),
        text(),
        text(),
        prop::collection::vec(text(), 0..4),
        value(),
    )
        .prop_map(|(error_code, timestamp, subject, sender, recipients, content)| Message {
            error_code,
            timestamp,
            subject,
            sender,
            recipients,
            content,
            reliable: true,
        })
}

fn codec(key: &Option<Vec<u8>>) -> FrameCodec {
    match key {
        Some(key) => FrameCodec::with_cipher(FrameCipher::new(key).unwrap()),
        None => FrameCodec::new(),
    }
}

fn cipher_key() -> impl Strategy<Value = Option<Vec<u8>>> {
    prop::option::of(prop::collection::vec(any::<u8>(), 4..=56))
}

// Property: every value decodes back to itself and consumes exactly its
// encoded length
proptest! {
    #[test]
    fn prop_value_roundtrip(v in value()) {
        let bytes = v.encode();
        prop_assert_eq!(bytes.len(), v.encoded_len());

        let (decoded, consumed) = Value::decode(&bytes, 0).expect("decode should not fail");
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(decoded, v);
    }
}

// Property: arbitrary bytes never panic the value decoder, and a success
// never claims more bytes than it was given
proptest! {
    #[test]
    fn prop_value_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        if let Ok((_, consumed)) = Value::decode(&data, 0) {
            prop_assert!(consumed <= data.len());
        }
    }
}

// Property: arbitrary bytes never panic the envelope decoder
proptest! {
    #[test]
    fn prop_message_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let _ = Message::decode(&data);
    }
}

// Property: envelopes survive a trip through the stream codec, with or
// without the cipher
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_message_codec_roundtrip(msg in message(), key in cipher_key()) {
        let mut encoder = MessageCodec::new(codec(&key));
        let mut decoder = MessageCodec::new(codec(&key));

        let mut buf = BytesMut::new();
        encoder.encode(msg.clone(), &mut buf).expect("encode should not fail");
        let decoded = decoder.decode(&mut buf).expect("decode should not fail");

        prop_assert_eq!(decoded, Some(msg));
        prop_assert!(buf.is_empty());
    }
}

// Property: feeding a stream one byte at a time yields the same frames as
// feeding it in one chunk
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_frames_independent_of_chunking(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 2..300), 1..6),
        key in cipher_key(),
    ) {
        let mut encoder = codec(&key);
        let mut stream = BytesMut::new();
        for payload in &payloads {
            encoder.encode(Frame::new(payload.clone()), &mut stream).unwrap();
        }

        let mut whole = codec(&key);
        let mut all = stream.clone();
        let mut at_once = Vec::new();
        while let Some(frame) = whole.decode(&mut all).unwrap() {
            at_once.push(frame.payload);
        }

        let mut trickle = codec(&key);
        let mut buf = BytesMut::new();
        let mut one_by_one = Vec::new();
        for byte in stream.iter() {
            buf.extend_from_slice(&[*byte]);
            while let Some(frame) = trickle.decode(&mut buf).unwrap() {
                one_by_one.push(frame.payload);
            }
        }

        prop_assert_eq!(&at_once, &payloads);
        prop_assert_eq!(one_by_one, payloads);
    }
}

// Property: arbitrary bytes never panic the frame decoder
proptest! {
    #[test]
    fn prop_frame_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&data[..]);
        while let Ok(Some(_)) = codec.decode(&mut buf) {}
    }
}

// Property: property list lookup ignores case and returns the first match
proptest! {
    #[test]
    fn prop_proplist_lookup_ignores_case(key in "[a-z]{1,12}", first in any::<i32>(), second in any::<i32>()) {
        let mut list = PropList::new();
        list.push(Value::symbol(&key), Value::Integer(first));
        list.push(Value::String(key.to_ascii_uppercase()), Value::Integer(second));

        prop_assert_eq!(list.find(&key.to_ascii_uppercase()), Some(&Value::Integer(first)));
        prop_assert_eq!(list.len(), 2);
    }
}

//! Wire layout of typed values and message envelopes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use multiuser_server::core::proplist::PropList;
use multiuser_server::core::value::Value;
use multiuser_server::error::ProtocolError;
use multiuser_server::protocol::message::Message;

#[test]
fn test_string_layout() {
    assert_eq!(
        Value::from("ab").encode(),
        vec![0, 3, 0, 0, 0, 2, b'a', b'b']
    );
    assert_eq!(Value::symbol("").encode(), vec![0, 2, 0, 0, 0, 0]);
}

#[test]
fn test_list_layout() {
    let list = Value::List(vec![Value::Integer(1), Value::Void]);
    assert_eq!(
        list.encode(),
        vec![0, 7, 0, 0, 0, 2, 0, 1, 0, 0, 0, 1, 0, 0]
    );
}

#[test]
fn test_proplist_layout_keeps_order() {
    let props = PropList::new().with("b", 2).with("a", 1);
    let bytes = Value::PropList(props.clone()).encode();

    assert_eq!(&bytes[..6], &[0, 10, 0, 0, 0, 2]);
    // First key is the symbol "b".
    assert_eq!(&bytes[6..13], &[0, 2, 0, 0, 0, 1, b'b']);

    let (decoded, _) = Value::decode(&bytes, 0).unwrap();
    let decoded = decoded.as_prop_list().unwrap().clone();
    assert_eq!(decoded.key_at(0), Some(&Value::symbol("b")));
    assert_eq!(decoded, props);
}

#[test]
fn test_point_and_rect_nest_integers() {
    let point = Value::Point { x: 3, y: -1 };
    let bytes = point.encode();
    assert_eq!(
        bytes,
        vec![0, 8, 0, 1, 0, 0, 0, 3, 0, 1, 0xff, 0xff, 0xff, 0xff]
    );

    let rect = Value::Rect {
        left: 0,
        top: 0,
        right: 640,
        bottom: 480,
    };
    assert_eq!(rect.encoded_len(), 26);
    assert_eq!(Value::decode(&rect.encode(), 0).unwrap().0, rect);
}

#[test]
fn test_color_and_date() {
    let color = Value::Color {
        red: 10,
        green: 20,
        blue: 30,
    };
    assert_eq!(color.encode(), vec![0, 18, 0, 10, 20, 30]);

    let date = Value::Date([1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(date.encode()[2..], [1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_consecutive_values_decode_by_offset() {
    let mut buf = Value::Integer(9).encode();
    buf.extend(Value::from("hello").encode());
    buf.extend(Value::Float(2.5).encode());

    let (first, used) = Value::decode(&buf, 0).unwrap();
    let (second, used2) = Value::decode(&buf, used).unwrap();
    let (third, used3) = Value::decode(&buf, used + used2).unwrap();

    assert_eq!(first, Value::Integer(9));
    assert_eq!(second, Value::from("hello"));
    assert_eq!(third, Value::Float(2.5));
    assert_eq!(used + used2 + used3, buf.len());
}

#[test]
fn test_truncated_values_fail() {
    for value in [
        Value::Integer(7),
        Value::from("truncated!"),
        Value::List(vec![Value::Integer(1), Value::Integer(2)]),
        Value::Transform3(Box::new([1.0; 16])),
    ] {
        let bytes = value.encode();
        for cut in 2..bytes.len() {
            let err = Value::decode(&bytes[..cut], 0);
            assert!(
                matches!(err, Err(ProtocolError::Decode(_))),
                "{value:?} cut at {cut} should fail, got {err:?}"
            );
        }
    }
}

#[test]
fn test_string_length_beyond_buffer() {
    let bytes = [0, 3, 0x7f, 0xff, 0xff, 0xff, b'x'];
    assert!(matches!(
        Value::decode(&bytes, 0),
        Err(ProtocolError::Decode(_))
    ));
}

#[test]
fn test_missing_final_pad_is_tolerated() {
    // An odd-length string at the very end may arrive without its pad byte.
    let bytes = [0, 3, 0, 0, 0, 1, b'z'];
    let (value, used) = Value::decode(&bytes, 0).unwrap();
    assert_eq!(value, Value::from("z"));
    assert_eq!(used, bytes.len());
}

#[test]
fn test_envelope_layout() {
    let msg = Message {
        error_code: 0,
        timestamp: 258,
        subject: "Hi".to_string(),
        sender: "ann".to_string(),
        recipients: vec!["@Room".to_string()],
        content: Value::Integer(5),
        reliable: true,
    };
    let bytes = msg.encode();

    let mut expected = vec![0, 0, 0, 0, 0, 0, 1, 2];
    expected.extend([0, 0, 0, 2, b'H', b'i']);
    expected.extend([0, 0, 0, 3, b'a', b'n', b'n', 0]);
    expected.extend([0, 0, 0, 1]);
    expected.extend([0, 0, 0, 5, b'@', b'R', b'o', b'o', b'm', 0]);
    expected.extend([0, 1, 0, 0, 0, 5]);
    assert_eq!(bytes, expected);
    assert_eq!(msg.encoded_len(), bytes.len());
    assert_eq!(Message::decode(&bytes).unwrap(), msg);
}

#[test]
fn test_envelope_negative_error_code() {
    let msg = Message::new("Logon", "System", vec!["ann".into()], Value::Void)
        .with_error(multiuser_server::ErrorCode::InvalidMovieId);
    let decoded = Message::decode(&msg.encode()).unwrap();
    assert_eq!(decoded.error(), Some(multiuser_server::ErrorCode::InvalidMovieId));
    assert!(decoded.error_code < 0);
}

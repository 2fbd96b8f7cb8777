//! # Typed Values
//!
//! Self-describing values exchanged as message content.
//!
//! ## Wire Format
//! ```text
//! [Tag(2)] [Payload]
//! ```
//! Every encoding starts with its own tag, so encodings nest and concatenate
//! without outside type information. Containers carry a u32 element count
//! followed by fully tagged elements (pairs, for property lists). Blob-like
//! payloads (`String`, `Symbol`, `Picture`, `Media`) are u32 length-prefixed
//! and padded with one zero byte when the length is odd; the pad is not part
//! of the logical length.
//!
//! ## Security
//! - Every length and count is validated against the remaining bytes before
//!   anything is allocated; a failure is a fatal [`ProtocolError::Decode`].
//! - Nesting depth is capped at [`MAX_DEPTH`].
//! - Unknown tags decode as [`Value::Void`] so newer peers stay readable.

use crate::core::proplist::PropList;
use crate::core::wire::{padded_blob_len, put_padded_blob, Reader};
use crate::error::{constants, ProtocolError, Result};
use bytes::BufMut;
use std::fmt;

/// Deepest container nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

/// Type tags as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ValueTag {
    Void = 0,
    Integer = 1,
    Symbol = 2,
    String = 3,
    Picture = 5,
    Float = 6,
    List = 7,
    Point = 8,
    Rect = 9,
    PropList = 10,
    Color = 18,
    Date = 19,
    Media = 20,
    Vector3 = 22,
    Transform3 = 23,
}

impl ValueTag {
    pub fn from_u16(tag: u16) -> Option<Self> {
        Some(match tag {
            0 => ValueTag::Void,
            1 => ValueTag::Integer,
            2 => ValueTag::Symbol,
            3 => ValueTag::String,
            5 => ValueTag::Picture,
            6 => ValueTag::Float,
            7 => ValueTag::List,
            8 => ValueTag::Point,
            9 => ValueTag::Rect,
            10 => ValueTag::PropList,
            18 => ValueTag::Color,
            19 => ValueTag::Date,
            20 => ValueTag::Media,
            22 => ValueTag::Vector3,
            23 => ValueTag::Transform3,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Void,
    Integer(i32),
    Float(f64),
    Symbol(String),
    String(String),
    Picture(Vec<u8>),
    List(Vec<Value>),
    PropList(PropList),
    Point {
        x: i32,
        y: i32,
    },
    Rect {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },
    Color {
        red: u8,
        green: u8,
        blue: u8,
    },
    /// Opaque 8-byte client date stamp.
    Date([u8; 8]),
    Media(Vec<u8>),
    Vector3([f32; 3]),
    Transform3(Box<[f32; 16]>),
}

impl Value {
    pub fn symbol(name: &str) -> Self {
        Value::Symbol(name.to_string())
    }

    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Void => ValueTag::Void,
            Value::Integer(_) => ValueTag::Integer,
            Value::Float(_) => ValueTag::Float,
            Value::Symbol(_) => ValueTag::Symbol,
            Value::String(_) => ValueTag::String,
            Value::Picture(_) => ValueTag::Picture,
            Value::List(_) => ValueTag::List,
            Value::PropList(_) => ValueTag::PropList,
            Value::Point { .. } => ValueTag::Point,
            Value::Rect { .. } => ValueTag::Rect,
            Value::Color { .. } => ValueTag::Color,
            Value::Date(_) => ValueTag::Date,
            Value::Media(_) => ValueTag::Media,
            Value::Vector3(_) => ValueTag::Vector3,
            Value::Transform3(_) => ValueTag::Transform3,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Text of a `String` or `Symbol`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(f.round() as i32),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_prop_list(&self) -> Option<&PropList> {
        match self {
            Value::PropList(pl) => Some(pl),
            _ => None,
        }
    }

    /// Element count for containers, zero otherwise.
    pub fn count(&self) -> usize {
        match self {
            Value::List(items) => items.len(),
            Value::PropList(pl) => pl.len(),
            _ => 0,
        }
    }

    // ------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------

    /// Encodes the value, tag first.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_u16(self.tag() as u16);
        match self {
            Value::Void => {}
            Value::Integer(i) => out.put_i32(*i),
            Value::Float(f) => out.put_f64(*f),
            Value::Symbol(s) | Value::String(s) => put_padded_blob(out, s.as_bytes()),
            Value::Picture(b) | Value::Media(b) => put_padded_blob(out, b),
            Value::List(items) => {
                out.put_u32(items.len() as u32);
                for item in items {
                    item.encode_into(out);
                }
            }
            Value::PropList(pl) => {
                out.put_u32(pl.len() as u32);
                for (k, v) in pl.iter() {
                    k.encode_into(out);
                    v.encode_into(out);
                }
            }
            Value::Point { x, y } => {
                for c in [*x, *y] {
                    Value::Integer(c).encode_into(out);
                }
            }
            Value::Rect {
                left,
                top,
                right,
                bottom,
            } => {
                for c in [*left, *top, *right, *bottom] {
                    Value::Integer(c).encode_into(out);
                }
            }
            Value::Color { red, green, blue } => out.put_slice(&[0, *red, *green, *blue]),
            Value::Date(raw) => out.put_slice(raw),
            Value::Vector3(v) => v.iter().for_each(|c| out.put_f32(*c)),
            Value::Transform3(m) => m.iter().for_each(|c| out.put_f32(*c)),
        }
    }

    /// Exact byte length of [`Value::encode`].
    pub fn encoded_len(&self) -> usize {
        2 + match self {
            Value::Void => 0,
            Value::Integer(_) => 4,
            Value::Float(_) => 8,
            Value::Symbol(s) | Value::String(s) => padded_blob_len(s.len()),
            Value::Picture(b) | Value::Media(b) => padded_blob_len(b.len()),
            Value::List(items) => 4 + items.iter().map(Value::encoded_len).sum::<usize>(),
            Value::PropList(pl) => {
                4 + pl
                    .iter()
                    .map(|(k, v)| k.encoded_len() + v.encoded_len())
                    .sum::<usize>()
            }
            Value::Point { .. } => 2 * 6,
            Value::Rect { .. } => 4 * 6,
            Value::Color { .. } => 4,
            Value::Date(_) => 8,
            Value::Vector3(_) => 12,
            Value::Transform3(_) => 64,
        }
    }

    // ------------------------------------------------------------------
    // Decoding
    // ------------------------------------------------------------------

    /// Decodes one value starting at `offset`, returning it with the number
    /// of bytes consumed.
    pub fn decode(buf: &[u8], offset: usize) -> Result<(Value, usize)> {
        let slice = buf.get(offset..).ok_or_else(|| {
            ProtocolError::Decode(format!("offset {offset} beyond buffer of {}", buf.len()))
        })?;
        let mut reader = Reader::new(slice);
        let value = Value::read(&mut reader)?;
        Ok((value, reader.consumed()))
    }

    /// Decodes one value from the reader's current position.
    pub fn read(reader: &mut Reader<'_>) -> Result<Value> {
        Self::read_nested(reader, 0)
    }

    fn read_nested(reader: &mut Reader<'_>, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::Decode(constants::ERR_TOO_DEEP.to_string()));
        }
        let raw_tag = reader.read_u16()?;
        let Some(tag) = ValueTag::from_u16(raw_tag) else {
            return Ok(Value::Void);
        };

        Ok(match tag {
            ValueTag::Void => Value::Void,
            ValueTag::Integer => Value::Integer(reader.read_i32()?),
            ValueTag::Float => Value::Float(reader.read_f64()?),
            ValueTag::Symbol => Value::Symbol(read_text(reader)?),
            ValueTag::String => Value::String(read_text(reader)?),
            ValueTag::Picture => Value::Picture(reader.read_padded_blob()?.to_vec()),
            ValueTag::Media => Value::Media(reader.read_padded_blob()?.to_vec()),
            ValueTag::List => {
                let raw = reader.read_u32()?;
                let count = reader.check_count(raw, 2)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::read_nested(reader, depth + 1)?);
                }
                Value::List(items)
            }
            ValueTag::PropList => {
                let raw = reader.read_u32()?;
                let count = reader.check_count(raw, 4)?;
                let mut pl = PropList::with_capacity(count);
                for _ in 0..count {
                    let key = Self::read_nested(reader, depth + 1)?;
                    let value = Self::read_nested(reader, depth + 1)?;
                    pl.push(key, value);
                }
                Value::PropList(pl)
            }
            ValueTag::Point => {
                let x = read_coordinate(reader, depth)?;
                let y = read_coordinate(reader, depth)?;
                Value::Point { x, y }
            }
            ValueTag::Rect => Value::Rect {
                left: read_coordinate(reader, depth)?,
                top: read_coordinate(reader, depth)?,
                right: read_coordinate(reader, depth)?,
                bottom: read_coordinate(reader, depth)?,
            },
            ValueTag::Color => {
                let [_, red, green, blue] = reader.read_array::<4>()?;
                Value::Color { red, green, blue }
            }
            ValueTag::Date => Value::Date(reader.read_array::<8>()?),
            ValueTag::Vector3 => {
                let mut v = [0f32; 3];
                for c in v.iter_mut() {
                    *c = reader.read_f32()?;
                }
                Value::Vector3(v)
            }
            ValueTag::Transform3 => {
                let mut m = Box::new([0f32; 16]);
                for c in m.iter_mut() {
                    *c = reader.read_f32()?;
                }
                Value::Transform3(m)
            }
        })
    }
}

fn read_text(reader: &mut Reader<'_>) -> Result<String> {
    let bytes = reader.read_padded_blob()?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Point and rect coordinates are nested tagged numbers. Floats are rounded;
/// any other coordinate type is a decode error.
fn read_coordinate(reader: &mut Reader<'_>, depth: usize) -> Result<i32> {
    Value::read_nested(reader, depth + 1)?
        .as_integer()
        .ok_or_else(|| ProtocolError::Decode(constants::ERR_BAD_COORDINATE.to_string()))
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<PropList> for Value {
    fn from(pl: PropList) -> Self {
        Value::PropList(pl)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("<Void>"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:.4}"),
            Value::Symbol(s) => write!(f, "#{s}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Picture(b) => write!(f, "<Picture {} bytes>", b.len()),
            Value::Media(b) => write!(f, "<Media {} bytes>", b.len()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::PropList(pl) => write!(f, "{pl}"),
            Value::Point { x, y } => write!(f, "point({x}, {y})"),
            Value::Rect {
                left,
                top,
                right,
                bottom,
            } => write!(f, "rect({left}, {top}, {right}, {bottom})"),
            Value::Color { red, green, blue } => write!(f, "rgb({red}, {green}, {blue})"),
            Value::Date(_) => f.write_str("<Date>"),
            Value::Vector3([x, y, z]) => write!(f, "vector({x}, {y}, {z})"),
            Value::Transform3(_) => f.write_str("<Transform>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: &Value) -> Value {
        let bytes = v.encode();
        assert_eq!(bytes.len(), v.encoded_len(), "encoded_len mismatch for {v}");
        let (decoded, used) = Value::decode(&bytes, 0).expect("decode");
        assert_eq!(used, bytes.len());
        decoded
    }

    #[test]
    fn test_integer_layout() {
        assert_eq!(Value::Integer(-2).encode(), vec![0, 1, 0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn test_odd_string_is_padded() {
        let bytes = Value::from("abc").encode();
        assert_eq!(bytes, vec![0, 3, 0, 0, 0, 3, b'a', b'b', b'c', 0]);
        assert_eq!(roundtrip(&Value::from("abc")), Value::from("abc"));
    }

    #[test]
    fn test_media_even_length_not_padded() {
        let media = Value::Media(vec![1, 2, 3, 4]);
        assert_eq!(media.encode().len(), 2 + 4 + 4);
        assert_eq!(roundtrip(&media), media);
    }

    #[test]
    fn test_unknown_tag_is_void() {
        let (value, used) = Value::decode(&[0x01, 0x00, 1, 2, 3], 0).expect("decode");
        assert_eq!(value, Value::Void);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_decode_at_offset() {
        let mut bytes = vec![0xAA, 0xBB];
        bytes.extend(Value::Integer(9).encode());
        let (value, used) = Value::decode(&bytes, 2).expect("decode");
        assert_eq!(value, Value::Integer(9));
        assert_eq!(used, 6);
        assert!(Value::decode(&bytes, 99).is_err());
    }

    #[test]
    fn test_hostile_list_count_rejected() {
        let bytes = [0, 7, 0x7F, 0xFF, 0xFF, 0xFF, 0, 1];
        assert!(matches!(Value::decode(&bytes, 0), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_depth_limit() {
        let mut v = Value::Integer(1);
        for _ in 0..(MAX_DEPTH + 2) {
            v = Value::List(vec![v]);
        }
        let bytes = v.encode();
        assert!(matches!(Value::decode(&bytes, 0), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_point_accepts_float_coordinates() {
        let mut bytes = vec![0, 8];
        bytes.extend(Value::Float(2.6).encode());
        bytes.extend(Value::Integer(-4).encode());
        let (value, _) = Value::decode(&bytes, 0).expect("decode");
        assert_eq!(value, Value::Point { x: 3, y: -4 });
    }

    #[test]
    fn test_non_numeric_coordinate_is_rejected() {
        let mut bytes = vec![0, 9];
        bytes.extend(Value::Integer(0).encode());
        bytes.extend(Value::from("top").encode());
        bytes.extend(Value::Integer(640).encode());
        bytes.extend(Value::Integer(480).encode());
        assert!(matches!(Value::decode(&bytes, 0), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_display() {
        let v = Value::List(vec![
            Value::Integer(1),
            Value::symbol("a"),
            Value::PropList(PropList::new().with("k", "v")),
        ]);
        assert_eq!(v.to_string(), "[1, #a, [#k: \"v\"]]");
    }
}

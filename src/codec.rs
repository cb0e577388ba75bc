//! The RESP wire codec: a byte-exact, streaming, recursive parser and a
//! reentrant serializer.
//!
//! Zero-copy: string payloads are tracked as `(start, end)` byte ranges into
//! the input buffer and only materialized into owned `Bytes` once a value's
//! full extent is known. Bulk strings are read by declared byte count, never
//! by line-splitting, so embedded CR/LF bytes in the payload survive
//! byte-exact. Arrays nest no deeper than `MAX_DEPTH` to bound stack use on
//! hostile input.

use bytes::{Bytes, BytesMut};
use memchr::memchr;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::value::Value;

/// Arrays nesting deeper than this fail with [`CodecError::RecursionLimitExceeded`]
/// rather than exhausting the stack on hostile input.
const MAX_DEPTH: usize = 32;

/// A `(start, end)` byte range into a buffer, used to avoid copying string
/// payloads until a value actually needs to be materialized.
#[derive(Debug, Clone, Copy)]
struct BufSplit(usize, usize);

impl BufSplit {
    fn as_bytes(&self, buf: &Bytes) -> Bytes {
        buf.slice(self.0..self.1)
    }
}

/// Mirrors [`Value`] but holds string payloads as unresolved [`BufSplit`]s.
#[derive(Debug)]
enum RawValue {
    Nil,
    Int(i64),
    Str(BufSplit),
    Err(BufSplit),
    Array(Vec<RawValue>),
}

impl RawValue {
    fn into_value(self, buf: &Bytes) -> Value {
        match self {
            RawValue::Nil => Value::Nil,
            RawValue::Int(i) => Value::Int(i),
            RawValue::Str(s) => Value::Str(s.as_bytes(buf)),
            RawValue::Err(e) => Value::Err(e.as_bytes(buf)),
            RawValue::Array(items) => {
                Value::Array(items.into_iter().map(|v| v.into_value(buf)).collect())
            }
        }
    }
}

type ParseResult = Result<Option<(usize, RawValue)>, CodecError>;

/// Finds the line starting at `pos`, returning the position just past its
/// trailing CRLF and the `BufSplit` covering the line's content.
fn word(buf: &BytesMut, pos: usize) -> Option<(usize, BufSplit)> {
    if buf.len() <= pos {
        return None;
    }
    memchr(b'\r', &buf[pos..]).and_then(|rel| {
        let cr = pos + rel;
        if cr + 1 < buf.len() {
            Some((cr + 2, BufSplit(pos, cr)))
        } else {
            None
        }
    })
}

fn parse_int(buf: &BytesMut, pos: usize) -> Result<Option<(usize, i64)>, CodecError> {
    match word(buf, pos) {
        Some((next, w)) => {
            let s = std::str::from_utf8(&buf[w.0..w.1]).map_err(|_| CodecError::TypeMismatch)?;
            let n = s.parse::<i64>().map_err(|_| CodecError::TypeMismatch)?;
            Ok(Some((next, n)))
        }
        None => Ok(None),
    }
}

fn parse_one(buf: &BytesMut, pos: usize, depth: usize) -> ParseResult {
    if depth > MAX_DEPTH {
        return Err(CodecError::RecursionLimitExceeded);
    }
    if buf.len() <= pos {
        return Ok(None);
    }

    match buf[pos] {
        b'+' => Ok(word(buf, pos + 1).map(|(next, w)| (next, RawValue::Str(w)))),
        b'-' => Ok(word(buf, pos + 1).map(|(next, w)| (next, RawValue::Err(w)))),
        b':' => Ok(parse_int(buf, pos + 1)?.map(|(next, n)| (next, RawValue::Int(n)))),
        b'$' => bulk_string(buf, pos + 1),
        b'*' => array(buf, pos + 1, depth),
        _ => Err(CodecError::UnsupportedType),
    }
}

fn bulk_string(buf: &BytesMut, pos: usize) -> ParseResult {
    match parse_int(buf, pos)? {
        Some((start, -1)) => Ok(Some((start, RawValue::Nil))),
        Some((start, len)) if len >= 0 => {
            let len = len as usize;
            let end = start + len;
            // Need the payload plus its trailing CRLF.
            if buf.len() < end + 2 {
                Ok(None)
            } else {
                Ok(Some((end + 2, RawValue::Str(BufSplit(start, end)))))
            }
        }
        Some((_, _bad_len)) => Err(CodecError::NumberOfBytesOff),
        None => Ok(None),
    }
}

fn array(buf: &BytesMut, pos: usize, depth: usize) -> ParseResult {
    match parse_int(buf, pos)? {
        None => Ok(None),
        Some((start, -1)) => Ok(Some((start, RawValue::Nil))),
        Some((start, count)) if count >= 0 => {
            let mut items = Vec::with_capacity(count as usize);
            let mut cur = start;
            for _ in 0..count {
                match parse_one(buf, cur, depth + 1)? {
                    Some((next, value)) => {
                        cur = next;
                        items.push(value);
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((cur, RawValue::Array(items))))
        }
        Some((_, _bad)) => Err(CodecError::TypeMismatch),
    }
}

/// Parses exactly one value from the start of `buf`, if enough bytes are
/// present; returns `Ok(None)` to request more input.
fn decode_one(buf: &mut BytesMut) -> Result<Option<Value>, CodecError> {
    match parse_one(buf, 0, 0)? {
        Some((consumed, raw)) => {
            let data = buf.split_to(consumed).freeze();
            Ok(Some(raw.into_value(&data)))
        }
        None => Ok(None),
    }
}

/// Parses every value concatenated in `bytes` (used by persistence, which
/// reads a whole snapshot file rather than a live socket stream).
pub fn parse_all(bytes: &[u8]) -> Result<Vec<Value>, CodecError> {
    let mut buf = BytesMut::from(bytes);
    let mut values = Vec::new();
    while !buf.is_empty() {
        match decode_one(&mut buf)? {
            Some(v) => values.push(v),
            None => return Err(CodecError::CannotReadData),
        }
    }
    Ok(values)
}

/// Serializes a single value into its RESP wire form.
pub fn serialize(value: &Value) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf)?;
    Ok(buf.freeze())
}

/// Encodes a simple string (`+...\r\n`). Exposed separately from the main
/// `Value` dispatch since no stored/parsed `Value` variant is tagged as a
/// simple string on the wire (both `+` and `$` decode to `Value::Str`).
pub fn serialize_simple_string(s: &[u8]) -> Result<Bytes, CodecError> {
    if s.iter().any(|&b| b == b'\r' || b == b'\n') {
        return Err(CodecError::SimpleStringInvalid);
    }
    let mut buf = BytesMut::with_capacity(s.len() + 3);
    buf.extend_from_slice(b"+");
    buf.extend_from_slice(s);
    buf.extend_from_slice(b"\r\n");
    Ok(buf.freeze())
}

fn encode_into(value: &Value, dst: &mut BytesMut) -> Result<(), CodecError> {
    match value {
        Value::Nil => dst.extend_from_slice(b"$-1\r\n"),
        Value::Int(i) => {
            dst.extend_from_slice(b":");
            dst.extend_from_slice(i.to_string().as_bytes());
            dst.extend_from_slice(b"\r\n");
        }
        Value::Str(s) => {
            dst.extend_from_slice(b"$");
            dst.extend_from_slice(s.len().to_string().as_bytes());
            dst.extend_from_slice(b"\r\n");
            dst.extend_from_slice(s);
            dst.extend_from_slice(b"\r\n");
        }
        Value::Err(e) => {
            if e.is_empty() {
                return Err(CodecError::EmptyError);
            }
            dst.extend_from_slice(b"-");
            dst.extend_from_slice(e);
            dst.extend_from_slice(b"\r\n");
        }
        Value::Array(items) => {
            dst.extend_from_slice(b"*");
            dst.extend_from_slice(items.len().to_string().as_bytes());
            dst.extend_from_slice(b"\r\n");
            for item in items {
                encode_into(item, dst)?;
            }
        }
        Value::List(list) => {
            let items = list.snapshot();
            dst.extend_from_slice(b"*");
            dst.extend_from_slice(items.len().to_string().as_bytes());
            dst.extend_from_slice(b"\r\n");
            for item in items {
                encode_into(&Value::Str(item), dst)?;
            }
        }
    }
    Ok(())
}

/// `tokio_util::codec::{Decoder, Encoder}` over a connection's `BytesMut`,
/// so a `Framed<TcpStream, RespCodec>` speaks whole [`Value`]s. Parsing and
/// serializing never themselves `.await`; only the surrounding connection
/// task does.
#[derive(Default)]
pub struct RespCodec;

impl Decoder for RespCodec {
    type Item = Value;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }
        decode_one(src)
    }
}

impl Encoder<Value> for RespCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), CodecError> {
        encode_into(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_complete(bytes: &[u8]) -> Value {
        let mut buf = BytesMut::from(bytes);
        decode_one(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn decodes_ping_array() {
        let v = decode_complete(b"*1\r\n$4\r\nPING\r\n");
        assert_eq!(v, Value::Array(vec![Value::str("PING")]));
    }

    #[test]
    fn decodes_simple_string() {
        assert_eq!(decode_complete(b"+OK\r\n"), Value::str("OK"));
    }

    #[test]
    fn decodes_error() {
        assert_eq!(decode_complete(b"-oops\r\n"), Value::err("oops"));
    }

    #[test]
    fn decodes_integer() {
        assert_eq!(decode_complete(b":42\r\n"), Value::Int(42));
    }

    #[test]
    fn decodes_negative_integer() {
        assert_eq!(decode_complete(b":-7\r\n"), Value::Int(-7));
    }

    #[test]
    fn bad_integer_is_type_mismatch() {
        let mut buf = BytesMut::from(&b":abc\r\n"[..]);
        assert!(matches!(decode_one(&mut buf), Err(CodecError::TypeMismatch)));
    }

    #[test]
    fn unknown_prefix_is_unsupported_type() {
        let mut buf = BytesMut::from(&b"!nope\r\n"[..]);
        assert!(matches!(
            decode_one(&mut buf),
            Err(CodecError::UnsupportedType)
        ));
    }

    #[test]
    fn null_bulk_string_is_nil() {
        assert_eq!(decode_complete(b"$-1\r\n"), Value::Nil);
    }

    #[test]
    fn empty_bulk_string_is_distinct_from_nil() {
        assert_eq!(decode_complete(b"$0\r\n\r\n"), Value::str(""));
    }

    #[test]
    fn bulk_string_preserves_embedded_lf() {
        let v = decode_complete(b"$5\r\nab\ncd\r\n");
        assert_eq!(v, Value::str("ab\ncd"));
    }

    #[test]
    fn truncated_bulk_string_asks_for_more_input() {
        let mut buf = BytesMut::from(&b"$5\r\nab"[..]);
        assert_eq!(decode_one(&mut buf).unwrap(), None);
    }

    #[test]
    fn empty_array_is_valid() {
        assert_eq!(decode_complete(b"*0\r\n"), Value::Array(vec![]));
    }

    #[test]
    fn null_array_is_nil() {
        assert_eq!(decode_complete(b"*-1\r\n"), Value::Nil);
    }

    #[test]
    fn nested_arrays_decode_recursively() {
        let v = decode_complete(b"*2\r\n*1\r\n:1\r\n*1\r\n:2\r\n");
        assert_eq!(
            v,
            Value::Array(vec![
                Value::Array(vec![Value::Int(1)]),
                Value::Array(vec![Value::Int(2)]),
            ])
        );
    }

    #[test]
    fn too_deep_array_hits_recursion_limit() {
        let mut wire = Vec::new();
        for _ in 0..(MAX_DEPTH + 5) {
            wire.extend_from_slice(b"*1\r\n");
        }
        wire.extend_from_slice(b":1\r\n");
        let mut buf = BytesMut::from(&wire[..]);
        assert!(matches!(
            decode_one(&mut buf),
            Err(CodecError::RecursionLimitExceeded)
        ));
    }

    #[test]
    fn roundtrip_scalars_and_nested_arrays() {
        let values = vec![
            Value::Nil,
            Value::Int(i64::MIN),
            Value::Int(i64::MAX),
            Value::str("hello\nworld"),
            Value::err("ERR something"),
            Value::Array(vec![
                Value::Int(1),
                Value::Array(vec![Value::str("a"), Value::str("b")]),
                Value::Nil,
            ]),
        ];
        for v in values {
            let wire = serialize(&v).unwrap();
            let mut buf = BytesMut::from(&wire[..]);
            let decoded = decode_one(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn serializes_nil_as_null_bulk_string() {
        assert_eq!(serialize(&Value::Nil).unwrap(), Bytes::from_static(b"$-1\r\n"));
    }

    #[test]
    fn serializes_empty_array() {
        assert_eq!(
            serialize(&Value::Array(vec![])).unwrap(),
            Bytes::from_static(b"*0\r\n")
        );
    }

    #[test]
    fn serialize_rejects_empty_error() {
        assert!(matches!(
            serialize(&Value::Err(Bytes::new())),
            Err(CodecError::EmptyError)
        ));
    }

    #[test]
    fn simple_string_rejects_embedded_crlf() {
        assert!(matches!(
            serialize_simple_string(b"bad\r\nvalue"),
            Err(CodecError::SimpleStringInvalid)
        ));
        assert_eq!(
            serialize_simple_string(b"OK").unwrap(),
            Bytes::from_static(b"+OK\r\n")
        );
    }

    #[test]
    fn parse_all_reads_concatenated_values() {
        let wire = b"*1\r\n$4\r\nPING\r\n:5\r\n+OK\r\n";
        let values = parse_all(wire).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Array(vec![Value::str("PING")]),
                Value::Int(5),
                Value::str("OK"),
            ]
        );
    }
}

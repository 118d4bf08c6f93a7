//! Record format decoding
//!
//! A record is a header (its own size as a varint, then one serial type
//! varint per column) followed by the column bodies in the same order. The
//! serial type fixes both the storage class and the body length.

use crate::error::{Error, Result};
use crate::schema::Encoding;
use crate::storage::btree::read_varint;
use crate::types::{RowId, Value};
use crate::utf::decode_text;

/// Serial type of one record column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialType {
    /// NULL value (serial type 0)
    Null,
    /// 8-bit signed integer (serial type 1)
    Int8,
    /// 16-bit big-endian integer (serial type 2)
    Int16,
    /// 24-bit big-endian integer (serial type 3)
    Int24,
    /// 32-bit big-endian integer (serial type 4)
    Int32,
    /// 48-bit big-endian integer (serial type 5)
    Int48,
    /// 64-bit big-endian integer (serial type 6)
    Int64,
    /// 64-bit IEEE float (serial type 7)
    Float64,
    /// Integer constant 0 (serial type 8)
    Zero,
    /// Integer constant 1 (serial type 9)
    One,
    /// Reserved (serial types 10-11)
    Reserved(u64),
    /// Blob of (N-12)/2 bytes
    Blob(usize),
    /// Text of (N-13)/2 bytes
    Text(usize),
}

impl SerialType {
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => SerialType::Null,
            1 => SerialType::Int8,
            2 => SerialType::Int16,
            3 => SerialType::Int24,
            4 => SerialType::Int32,
            5 => SerialType::Int48,
            6 => SerialType::Int64,
            7 => SerialType::Float64,
            8 => SerialType::Zero,
            9 => SerialType::One,
            10 | 11 => SerialType::Reserved(code),
            n if n % 2 == 0 => SerialType::Blob(((n - 12) / 2) as usize),
            n => SerialType::Text(((n - 13) / 2) as usize),
        }
    }

    /// Body length in bytes
    pub fn size(&self) -> usize {
        match self {
            SerialType::Null | SerialType::Zero | SerialType::One | SerialType::Reserved(_) => 0,
            SerialType::Int8 => 1,
            SerialType::Int16 => 2,
            SerialType::Int24 => 3,
            SerialType::Int32 => 4,
            SerialType::Int48 => 6,
            SerialType::Int64 | SerialType::Float64 => 8,
            SerialType::Blob(n) | SerialType::Text(n) => *n,
        }
    }
}

/// Decode the serial types of a record header.
///
/// Returns the serial types and the offset where the bodies begin.
pub fn decode_record_header(row_id: RowId, payload: &[u8]) -> Result<(Vec<SerialType>, usize)> {
    if payload.is_empty() {
        return Ok((Vec::new(), 0));
    }
    let corrupt = |message: String| Error::CorruptRecord { row_id, message };

    let (header_size, mut offset) = read_varint(payload, 0)
        .ok_or_else(|| corrupt("record header size truncated".to_string()))?;
    let header_size = header_size as usize;
    if header_size > payload.len() || header_size < offset {
        return Err(corrupt(format!(
            "header size {} invalid for {} byte record",
            header_size,
            payload.len()
        )));
    }

    let mut types = Vec::new();
    while offset < header_size {
        let (code, n) = read_varint(&payload[..header_size], offset)
            .ok_or_else(|| corrupt(format!("serial type at byte {} truncated", offset)))?;
        types.push(SerialType::from_code(code));
        offset += n;
    }
    Ok((types, header_size))
}

fn read_int(body: &[u8]) -> i64 {
    // Sign-extend from the first byte
    let mut v = body.first().map(|b| *b as i8 as i64).unwrap_or(0);
    for b in body.iter().skip(1) {
        v = (v << 8) | *b as i64;
    }
    v
}

/// Decode one column body
pub fn decode_value(
    serial_type: SerialType,
    body: &[u8],
    encoding: Encoding,
    row_id: RowId,
) -> Result<Value> {
    Ok(match serial_type {
        SerialType::Null => Value::Null,
        SerialType::Zero => Value::Integer(0),
        SerialType::One => Value::Integer(1),
        SerialType::Int8
        | SerialType::Int16
        | SerialType::Int24
        | SerialType::Int32
        | SerialType::Int48
        | SerialType::Int64 => Value::Integer(read_int(body)),
        SerialType::Float64 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(body);
            Value::Float(f64::from_be_bytes(bytes))
        }
        SerialType::Blob(_) => Value::Blob(body.to_vec()),
        SerialType::Text(_) => Value::Text(decode_text(body, encoding)),
        SerialType::Reserved(code) => {
            return Err(Error::CorruptRecord {
                row_id,
                message: format!("reserved serial type {}", code),
            })
        }
    })
}

/// Decode a full record payload into its column values
pub fn decode_record(row_id: RowId, payload: &[u8], encoding: Encoding) -> Result<Vec<Value>> {
    let (types, mut offset) = decode_record_header(row_id, payload)?;
    let mut values = Vec::with_capacity(types.len());
    for (column, serial_type) in types.into_iter().enumerate() {
        let end = offset + serial_type.size();
        let body = payload.get(offset..end).ok_or_else(|| Error::CorruptRecord {
            row_id,
            message: format!(
                "column {} needs bytes {}..{} of a {} byte record",
                column,
                offset,
                end,
                payload.len()
            ),
        })?;
        values.push(decode_value(serial_type, body, encoding, row_id)?);
        offset = end;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::write_varint;
    use proptest::prelude::*;

    /// Assemble a record from (serial type, body) pairs
    fn record(columns: &[(u64, Vec<u8>)]) -> Vec<u8> {
        let mut header = Vec::new();
        for (code, _) in columns {
            write_varint(*code, &mut header);
        }
        let mut out = vec![(header.len() + 1) as u8];
        out.extend_from_slice(&header);
        for (_, body) in columns {
            out.extend_from_slice(body);
        }
        out
    }

    #[test]
    fn test_serial_type_sizes() {
        assert_eq!(SerialType::from_code(5).size(), 6);
        assert_eq!(SerialType::from_code(12), SerialType::Blob(0));
        assert_eq!(SerialType::from_code(13), SerialType::Text(0));
        assert_eq!(SerialType::from_code(8212), SerialType::Blob(4100));
        assert_eq!(SerialType::from_code(8213), SerialType::Text(4100));
    }

    #[test]
    fn test_decode_mixed_record() {
        let payload = record(&[
            (0, vec![]),
            (13 + 2 * 3, b"omg".to_vec()),
            (2, 7331i16.to_be_bytes().to_vec()),
            (7, 1.5f64.to_be_bytes().to_vec()),
            (12 + 2 * 2, vec![0xde, 0xad]),
            (8, vec![]),
            (9, vec![]),
        ]);
        let values = decode_record(1, &payload, Encoding::Utf8).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Text("omg".to_string()),
                Value::Integer(7331),
                Value::Float(1.5),
                Value::Blob(vec![0xde, 0xad]),
                Value::Integer(0),
                Value::Integer(1),
            ]
        );
    }

    #[test]
    fn test_negative_six_byte_integer() {
        let bytes = (-11644473429i64).to_be_bytes()[2..].to_vec();
        let payload = record(&[(5, bytes)]);
        assert_eq!(
            decode_record(5, &payload, Encoding::Utf8).unwrap(),
            vec![Value::Integer(-11644473429)]
        );
    }

    #[test]
    fn test_utf16_text_column() {
        let text = crate::utf::encode_text("h\u{e9}", Encoding::Utf16be);
        let payload = record(&[(13 + 2 * text.len() as u64, text)]);
        assert_eq!(
            decode_record(1, &payload, Encoding::Utf16be).unwrap(),
            vec![Value::Text("h\u{e9}".to_string())]
        );
    }

    #[test]
    fn test_reserved_serial_type() {
        let payload = record(&[(1, vec![1]), (10, vec![])]);
        match decode_record(42, &payload, Encoding::Utf8) {
            Err(Error::CorruptRecord { row_id, message }) => {
                assert_eq!(row_id, 42);
                assert!(message.contains("10"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_body_past_end() {
        let mut payload = record(&[(13 + 2 * 10, b"short".to_vec())]);
        payload.truncate(payload.len() - 1);
        assert!(matches!(
            decode_record(3, &payload, Encoding::Utf8),
            Err(Error::CorruptRecord { row_id: 3, .. })
        ));
    }

    #[test]
    fn test_header_size_past_end() {
        assert!(matches!(
            decode_record(1, &[40, 1, 1], Encoding::Utf8),
            Err(Error::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_empty_payload_has_no_columns() {
        assert!(decode_record(1, &[], Encoding::Utf8).unwrap().is_empty());
    }

    fn int_serial_type(v: i64) -> (u64, usize) {
        let widths = [(1u64, 1usize), (2, 2), (3, 3), (4, 4), (5, 6)];
        for (code, width) in widths {
            let bits = width * 8;
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if v >= min && v <= max {
                return (code, width);
            }
        }
        (6, 8)
    }

    proptest! {
        #[test]
        fn prop_integer_widths_sign_extend(v in any::<i64>()) {
            let (code, width) = int_serial_type(v);
            let body = v.to_be_bytes()[8 - width..].to_vec();
            let payload = record(&[(code, body)]);
            prop_assert_eq!(
                decode_record(1, &payload, Encoding::Utf8).unwrap(),
                vec![Value::Integer(v)]
            );
        }
    }
}

//! Text decoding for record values.
//!
//! Text columns are stored in the database's header encoding. UTF-8 is
//! decoded lossily; UTF-16 is decoded unit by unit so that an unpaired
//! surrogate becomes U+FFFD instead of failing the whole value.

use crate::schema::Encoding;

const REPLACEMENT_CHAR: u32 = 0xFFFD;

/// Read one UTF-16 code unit pair starting at `pos` and advance `pos`.
///
/// Returns `None` once fewer than two bytes remain.
pub fn utf16_read(bytes: &[u8], pos: &mut usize, big_endian: bool) -> Option<u32> {
    let unit_at = |at: usize| -> Option<u16> {
        let pair = [*bytes.get(at)?, *bytes.get(at + 1)?];
        Some(if big_endian {
            u16::from_be_bytes(pair)
        } else {
            u16::from_le_bytes(pair)
        })
    };

    let unit = unit_at(*pos)?;
    *pos += 2;

    let cp = match unit {
        0xD800..=0xDBFF => match unit_at(*pos) {
            Some(low @ 0xDC00..=0xDFFF) => {
                *pos += 2;
                0x10000 + (((unit as u32 - 0xD800) << 10) | (low as u32 - 0xDC00))
            }
            _ => REPLACEMENT_CHAR,
        },
        0xDC00..=0xDFFF => REPLACEMENT_CHAR,
        _ => unit as u32,
    };
    Some(cp)
}

/// Append one code point as UTF-16 in the requested byte order.
pub fn utf16_write(buf: &mut Vec<u8>, cp: u32, big_endian: bool) {
    let mut units = [0u16; 2];
    let units = match char::from_u32(cp) {
        Some(c) => c.encode_utf16(&mut units),
        None => {
            units[0] = REPLACEMENT_CHAR as u16;
            &mut units[..1]
        }
    };
    for unit in units.iter() {
        if big_endian {
            buf.extend_from_slice(&unit.to_be_bytes());
        } else {
            buf.extend_from_slice(&unit.to_le_bytes());
        }
    }
}

/// Detect a UTF-16 BOM and return the encoding.
pub fn utf16_detect_bom(bytes: &[u8]) -> Option<Encoding> {
    match bytes {
        [0xFE, 0xFF, ..] => Some(Encoding::Utf16be),
        [0xFF, 0xFE, ..] => Some(Encoding::Utf16le),
        _ => None,
    }
}

/// Strip a UTF-16 BOM and return the detected encoding and slice.
pub fn utf16_strip_bom(bytes: &[u8], default_enc: Encoding) -> (Encoding, &[u8]) {
    match utf16_detect_bom(bytes) {
        Some(enc) => (enc, &bytes[2..]),
        None => (default_enc, bytes),
    }
}

/// Decode stored text in `encoding` to a Rust string.
pub fn decode_text(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Utf16le | Encoding::Utf16be => {
            let (enc, data) = utf16_strip_bom(bytes, encoding);
            let big_endian = enc == Encoding::Utf16be;
            let mut out = String::with_capacity(data.len() / 2);
            let mut pos = 0usize;
            while let Some(cp) = utf16_read(data, &mut pos, big_endian) {
                out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            out
        }
    }
}

/// Encode a string in `encoding`, the inverse of [`decode_text`].
pub fn encode_text(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Utf8 => text.as_bytes().to_vec(),
        Encoding::Utf16le | Encoding::Utf16be => {
            let big_endian = encoding == Encoding::Utf16be;
            let mut out = Vec::with_capacity(text.len() * 2);
            for c in text.chars() {
                utf16_write(&mut out, c as u32, big_endian);
            }
            out
        }
    }
}

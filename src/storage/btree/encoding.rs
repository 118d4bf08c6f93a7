//! Varint and big-endian integer helpers for page and record parsing

/// Read a varint at the given offset, returns `(value, bytes_consumed)`.
///
/// Returns `None` when the varint runs past the end of `data`.
pub fn read_varint(data: &[u8], start: usize) -> Option<(u64, usize)> {
    let mut value: u64 = 0;

    for i in 0..9 {
        let b = *data.get(start + i)?;
        if i < 8 {
            value = (value << 7) | (b & 0x7f) as u64;
            if b & 0x80 == 0 {
                return Some((value, i + 1));
            }
        } else {
            // 9th byte uses all 8 bits
            value = (value << 8) | b as u64;
            return Some((value, 9));
        }
    }

    None
}

/// Calculate the number of bytes needed to encode a varint
pub fn varint_len(value: u64) -> usize {
    if value <= 0x7f {
        1
    } else if value <= 0x3fff {
        2
    } else if value <= 0x1f_ffff {
        3
    } else if value <= 0x0fff_ffff {
        4
    } else if value <= 0x07_ffff_ffff {
        5
    } else if value <= 0x03ff_ffff_ffff {
        6
    } else if value <= 0x01_ffff_ffff_ffff {
        7
    } else if value <= 0x00ff_ffff_ffff_ffff {
        8
    } else {
        9
    }
}

/// Append a varint to a Vec
pub fn write_varint(value: u64, out: &mut Vec<u8>) {
    let len = varint_len(value);
    let start = out.len();
    out.resize(start + len, 0);
    let buf = &mut out[start..];
    if len == 9 {
        buf[8] = (value & 0xFF) as u8;
        let mut v = value >> 8;
        for i in (0..8).rev() {
            buf[i] = ((v & 0x7F) | 0x80) as u8;
            v >>= 7;
        }
    } else {
        let mut v = value;
        for i in (0..len).rev() {
            if i == len - 1 {
                buf[i] = (v & 0x7F) as u8;
            } else {
                buf[i] = ((v & 0x7F) | 0x80) as u8;
            }
            v >>= 7;
        }
    }
}

/// Read a big-endian u16 at the given offset
pub fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Read a big-endian u32 at the given offset
pub fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

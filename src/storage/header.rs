//! Database file header (the first 100 bytes of page 1)

use crate::error::{Error, Result};
use crate::schema::Encoding;
use crate::storage::btree::encoding::{read_u16, read_u32};
use crate::types::Pgno;

/// Size of the database header
pub const DB_HEADER_SIZE: usize = 100;

/// Magic string at offset 0
pub const SQLITE_FILE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Minimum page size
pub const MIN_PAGE_SIZE: u32 = 512;

/// Maximum page size
pub const MAX_PAGE_SIZE: u32 = 65536;

/// Parsed database header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbHeader {
    /// Page size in bytes
    pub page_size: u32,
    /// File format write version (1 legacy, 2 WAL)
    pub write_version: u8,
    /// File format read version (1 legacy, 2 WAL)
    pub read_version: u8,
    /// Bytes reserved at the end of each page
    pub reserve: u8,
    /// File change counter
    pub change_counter: u32,
    /// Database size in pages, as declared by the header
    pub page_count: Pgno,
    /// First freelist trunk page
    pub first_trunk_page: Pgno,
    /// Total number of freelist pages
    pub free_page_count: u32,
    /// Schema cookie
    pub schema_cookie: u32,
    /// Schema format number (1-4)
    pub schema_format: u32,
    /// Suggested cache size
    pub default_cache_size: u32,
    /// Largest root page (auto-vacuum), 0 otherwise
    pub largest_root_page: Pgno,
    /// Text encoding for all text values
    pub text_encoding: Encoding,
    /// User version pragma
    pub user_version: u32,
    /// Incremental vacuum mode flag
    pub incr_vacuum: u32,
    /// Application ID pragma
    pub application_id: u32,
    /// Change counter value when `page_count` was last valid
    pub version_valid_for: u32,
    /// SQLITE_VERSION_NUMBER of the last writer
    pub sqlite_version: u32,
}

impl DbHeader {
    /// Parse the 100-byte header
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DB_HEADER_SIZE {
            return Err(invalid(format!(
                "header needs {} bytes, got {}",
                DB_HEADER_SIZE,
                data.len()
            )));
        }
        if &data[0..16] != SQLITE_FILE_HEADER {
            return Err(invalid(format!(
                "bad magic {}",
                hex::encode(&data[0..16])
            )));
        }

        let raw_page_size = read_u16(data, 16).ok_or_else(|| invalid("missing page size"))?;
        let page_size = if raw_page_size == 1 {
            MAX_PAGE_SIZE
        } else {
            raw_page_size as u32
        };
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) || !page_size.is_power_of_two()
        {
            return Err(invalid(format!("bad page size {}", page_size)));
        }

        let reserve = data[20];
        if page_size - (reserve as u32) < 480 {
            return Err(invalid(format!(
                "reserved space {} leaves too little usable space in {} byte pages",
                reserve, page_size
            )));
        }
        // Payload fractions are fixed by the file format
        if data[21] != 64 || data[22] != 32 || data[23] != 32 {
            return Err(invalid(format!(
                "bad payload fractions {}/{}/{}",
                data[21], data[22], data[23]
            )));
        }

        let field = |offset: usize| read_u32(data, offset).unwrap_or(0);
        let text_encoding = match field(56) {
            0 | 1 => Encoding::Utf8,
            2 => Encoding::Utf16le,
            3 => Encoding::Utf16be,
            other => return Err(invalid(format!("bad text encoding {}", other))),
        };

        Ok(Self {
            page_size,
            write_version: data[18],
            read_version: data[19],
            reserve,
            change_counter: field(24),
            page_count: field(28),
            first_trunk_page: field(32),
            free_page_count: field(36),
            schema_cookie: field(40),
            schema_format: field(44),
            default_cache_size: field(48),
            largest_root_page: field(52),
            text_encoding,
            user_version: field(60),
            incr_vacuum: field(64),
            application_id: field(68),
            version_valid_for: field(92),
            sqlite_version: field(96),
        })
    }

    /// Usable bytes per page (page size minus reserved space)
    pub fn usable_size(&self) -> u32 {
        self.page_size - self.reserve as u32
    }

    /// Whether the declared page count can be trusted.
    ///
    /// Writers older than 3.7.0 do not maintain the in-header size; SQLite
    /// detects that by a mismatch between the change counter and the
    /// version-valid-for field.
    pub fn page_count_is_valid(&self) -> bool {
        self.page_count != 0 && self.change_counter == self.version_valid_for
    }

    /// Whether the header marks the database as WAL-mode
    pub fn is_wal_mode(&self) -> bool {
        self.write_version == 2 && self.read_version == 2
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidHeader {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(page_size: u16, page_count: u32) -> Vec<u8> {
        let mut data = vec![0u8; DB_HEADER_SIZE];
        data[0..16].copy_from_slice(SQLITE_FILE_HEADER);
        data[16..18].copy_from_slice(&page_size.to_be_bytes());
        data[18] = 2;
        data[19] = 2;
        data[21] = 64;
        data[22] = 32;
        data[23] = 32;
        data[24..28].copy_from_slice(&7u32.to_be_bytes());
        data[28..32].copy_from_slice(&page_count.to_be_bytes());
        data[44..48].copy_from_slice(&4u32.to_be_bytes());
        data[56..60].copy_from_slice(&1u32.to_be_bytes());
        data[92..96].copy_from_slice(&7u32.to_be_bytes());
        data[96..100].copy_from_slice(&3045001u32.to_be_bytes());
        data
    }

    #[test]
    fn test_parse_header() {
        let hdr = DbHeader::parse(&header_bytes(4096, 12)).unwrap();
        assert_eq!(hdr.page_size, 4096);
        assert_eq!(hdr.page_count, 12);
        assert_eq!(hdr.change_counter, 7);
        assert_eq!(hdr.text_encoding, Encoding::Utf8);
        assert_eq!(hdr.schema_format, 4);
        assert_eq!(hdr.sqlite_version, 3045001);
        assert_eq!(hdr.usable_size(), 4096);
        assert!(hdr.page_count_is_valid());
        assert!(hdr.is_wal_mode());
    }

    #[test]
    fn test_page_size_65536() {
        let hdr = DbHeader::parse(&header_bytes(1, 1)).unwrap();
        assert_eq!(hdr.page_size, 65536);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut data = header_bytes(4096, 1);
        data[0] = b'X';
        assert!(matches!(
            DbHeader::parse(&data),
            Err(Error::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_page_size() {
        for size in [0u16, 256, 1000, 3000] {
            assert!(DbHeader::parse(&header_bytes(size, 1)).is_err(), "{}", size);
        }
    }

    #[test]
    fn test_minimum_usable_size() {
        let mut data = header_bytes(512, 1);
        data[20] = 32;
        let hdr = DbHeader::parse(&data).unwrap();
        assert_eq!(hdr.usable_size(), 480);

        data[20] = 33;
        assert!(matches!(
            DbHeader::parse(&data),
            Err(Error::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_rejects_short_header() {
        assert!(matches!(
            DbHeader::parse(&[0u8; 40]),
            Err(Error::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_stale_page_count() {
        let mut data = header_bytes(1024, 3);
        data[92..96].copy_from_slice(&6u32.to_be_bytes());
        let hdr = DbHeader::parse(&data).unwrap();
        assert!(!hdr.page_count_is_valid());
    }

    #[test]
    fn test_utf16_encoding() {
        let mut data = header_bytes(1024, 1);
        data[56..60].copy_from_slice(&3u32.to_be_bytes());
        assert_eq!(
            DbHeader::parse(&data).unwrap().text_encoding,
            Encoding::Utf16be
        );
    }
}

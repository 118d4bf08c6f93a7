//! Page store over the main database file
//!
//! The Pager presents the database file as a sequence of fixed-size pages
//! addressed by 1-based page number. It knows nothing about the WAL; the
//! checkpoint engine layers WAL frames on top of it.

use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::os::VfsFile;
use crate::storage::header::{DbHeader, DB_HEADER_SIZE};
use crate::types::Pgno;

/// Read-only page store for one database file
pub struct Pager {
    /// Database file handle, `None` once closed
    fd: Mutex<Option<Box<dyn VfsFile>>>,
    /// Parsed file header
    header: DbHeader,
    /// File size in bytes at open time
    file_size: u64,
}

impl Pager {
    /// Open a pager on a database file, reading and validating the header
    pub fn open(mut fd: Box<dyn VfsFile>) -> Result<Self> {
        let file_size = fd.file_size()?;
        let mut buf = [0u8; DB_HEADER_SIZE];
        let n = fd.read(&mut buf, 0)?;
        if n < DB_HEADER_SIZE {
            return Err(Error::InvalidHeader {
                message: format!("file is {} bytes, shorter than the header", file_size),
            });
        }
        let header = DbHeader::parse(&buf)?;

        let declared = header.page_count as u64 * header.page_size as u64;
        if declared > file_size {
            warn!(
                page_count = header.page_count,
                file_size, "header page count exceeds file length"
            );
        } else if declared < file_size {
            debug!(
                trailing_bytes = file_size - declared,
                "file holds pages beyond the header page count"
            );
        }

        debug!(
            page_size = header.page_size,
            page_count = header.page_count,
            file_size,
            "opened database file"
        );

        Ok(Pager {
            fd: Mutex::new(Some(fd)),
            header,
            file_size,
        })
    }

    /// The parsed database header
    pub fn header(&self) -> &DbHeader {
        &self.header
    }

    /// Page size in bytes
    pub fn page_size(&self) -> u32 {
        self.header.page_size
    }

    /// Usable bytes per page
    pub fn usable_size(&self) -> u32 {
        self.header.usable_size()
    }

    /// Database size in pages as far as the main file knows.
    ///
    /// This is the header's count when it can be trusted, otherwise the
    /// number of whole pages in the file.
    pub fn page_count(&self) -> Pgno {
        if self.header.page_count_is_valid() {
            self.header.page_count
        } else {
            self.file_page_count()
        }
    }

    /// Number of whole pages physically present in the file
    pub fn file_page_count(&self) -> Pgno {
        (self.file_size / self.header.page_size as u64).min(Pgno::MAX as u64) as Pgno
    }

    /// Read one page image
    pub fn read_page(&self, pgno: Pgno) -> Result<Vec<u8>> {
        if pgno == 0 {
            return Err(Error::corrupt_page(0, "page number 0 does not exist"));
        }
        let page_size = self.header.page_size as usize;
        let offset = (pgno as u64 - 1) * page_size as u64;

        let mut guard = self.fd.lock().map_err(|_| Error::UseAfterClose)?;
        let fd = guard.as_mut().ok_or(Error::UseAfterClose)?;

        let mut data = vec![0u8; page_size];
        let n = fd.read(&mut data, offset)?;
        if n < page_size {
            return Err(Error::TruncatedFile {
                pgno,
                offset,
                needed: page_size,
                available: self.file_size,
            });
        }
        Ok(data)
    }

    /// Release the file handle; later reads fail with `UseAfterClose`
    pub fn close(&self) {
        if let Ok(mut guard) = self.fd.lock() {
            guard.take();
        }
    }

    /// Whether the pager has been closed
    pub fn is_closed(&self) -> bool {
        self.fd.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

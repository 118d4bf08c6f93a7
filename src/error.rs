//! Error types and Result aliases

use std::io;

use thiserror::Error;

use crate::types::Pgno;

/// Result type alias for reconstruction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reconstructing a database.
///
/// Structural errors carry the page number (and where relevant the
/// checkpoint ordinals) so a caller can tell exactly which unit of work
/// failed. A torn WAL tail is never reported here: it is the normal end of
/// the log.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying read failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The 100-byte database header is unreadable or malformed
    #[error("invalid database header: {message}")]
    InvalidHeader {
        /// What was wrong with the header
        message: String,
    },

    /// The WAL header is malformed or does not match the main file
    #[error("invalid WAL header: {message}")]
    InvalidWalHeader {
        /// What was wrong with the header
        message: String,
    },

    /// A page lies beyond the end of the underlying file
    #[error("page {pgno} truncated: need {needed} bytes at offset {offset}, file has {available}")]
    TruncatedFile {
        /// Page that could not be read in full
        pgno: Pgno,
        /// Byte offset of the page
        offset: u64,
        /// Bytes required
        needed: usize,
        /// Bytes available in the file
        available: u64,
    },

    /// The requested checkpoint does not exist in the WAL
    #[error("checkpoint {requested} out of range: {available} commit boundaries available")]
    CheckpointOutOfRange {
        /// Requested checkpoint ordinal
        requested: usize,
        /// Number of commit boundaries found
        available: usize,
    },

    /// A page could not be interpreted during traversal
    #[error("corrupt page {pgno}: {message}")]
    CorruptPage {
        /// Offending page
        pgno: Pgno,
        /// Description of the corruption
        message: String,
    },

    /// An overflow chain ended before the declared payload length
    #[error("overflow chain for row {row_id} on page {pgno} truncated: {collected} of {expected} bytes")]
    TruncatedOverflowChain {
        /// Leaf page holding the cell
        pgno: Pgno,
        /// Row id of the cell
        row_id: i64,
        /// Declared payload size
        expected: usize,
        /// Bytes recovered before the chain ended
        collected: usize,
    },

    /// A record could not be decoded
    #[error("corrupt record for row {row_id}: {message}")]
    CorruptRecord {
        /// Row id of the record
        row_id: i64,
        /// Description of the corruption
        message: String,
    },

    /// Decoded column count differs from the table schema
    #[error("schema mismatch in table {table} row {row_id}: expected {expected} columns, record has {found}")]
    SchemaMismatch {
        /// Table name
        table: String,
        /// Row id of the record
        row_id: i64,
        /// Columns declared by the schema
        expected: usize,
        /// Values present in the record
        found: usize,
    },

    /// No table with the requested name
    #[error("table not found: {name}")]
    TableNotFound {
        /// Requested table name
        name: String,
    },

    /// The database was closed
    #[error("database used after close")]
    UseAfterClose,
}

impl Error {
    /// Shorthand for a `CorruptPage` error
    pub fn corrupt_page(pgno: Pgno, message: impl Into<String>) -> Self {
        Error::CorruptPage {
            pgno,
            message: message.into(),
        }
    }

    /// Page number the error is scoped to, if any
    pub fn pgno(&self) -> Option<Pgno> {
        match self {
            Error::TruncatedFile { pgno, .. }
            | Error::CorruptPage { pgno, .. }
            | Error::TruncatedOverflowChain { pgno, .. } => Some(*pgno),
            _ => None,
        }
    }

    /// Whether the error invalidates the whole session rather than one unit of work
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidHeader { .. }
                | Error::InvalidWalHeader { .. }
                | Error::CheckpointOutOfRange { .. }
                | Error::UseAfterClose
        )
    }
}

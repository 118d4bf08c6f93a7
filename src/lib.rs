//! sqlite-recon: read-only forensic reconstruction of SQLite databases
//!
//! Opens a database file together with its write-ahead log and reads tables
//! and rows as they stood at any commit recorded in the WAL, including
//! commits that were never checkpointed into the main file.
//!
//! ```no_run
//! use sqlite_recon::Database;
//!
//! # fn main() -> sqlite_recon::Result<()> {
//! let db = Database::open("evidence.db", None, Some(1))?;
//! for table in db.tables()? {
//!     let table = table?;
//!     for row in table.rows()? {
//!         let row = row?;
//!         println!("{} {:?}", row.row_id(), row.values()?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod os;
pub mod parser;
pub mod record;
pub mod schema;
pub mod storage;
pub mod types;
pub mod utf;

pub use api::{Database, OpenOptions, Row, Rows, Table, Tables};
pub use error::{Error, Result};
pub use os::FileSource;
pub use schema::{Encoding, Schema, SchemaEntry};
pub use storage::header::DbHeader;
pub use storage::wal::Wal;
pub use types::{ColumnType, Pgno, RowId, Value};

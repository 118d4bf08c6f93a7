//! Public entry points: open a database, list its tables, read rows

pub mod config;
mod connection;
mod table;

pub use config::{wal_path, OpenOptions, WAL_SUFFIX};
pub use connection::Database;
pub use table::{Row, Rows, Table, Tables};

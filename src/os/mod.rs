//! OS abstraction layer: read-only file access for database and WAL images

pub mod vfs;

pub use vfs::{FileSource, VfsFile};

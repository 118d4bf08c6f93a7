//! Open-time configuration
//!
//! `OpenOptions` collects everything that selects one reconstruction of a
//! database: the WAL to replay, the checkpoint to stop at, and whether the
//! WAL sibling next to an on-disk database is picked up automatically.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::os::FileSource;

use super::connection::Database;

/// Suffix SQLite appends to the database path to name its WAL
pub const WAL_SUFFIX: &str = "-wal";

/// Builder for opening a [`Database`]
#[derive(Debug)]
pub struct OpenOptions {
    /// WAL image to replay
    pub(crate) wal: Option<FileSource>,
    /// Checkpoint ordinal; `None` selects the latest commit
    pub(crate) checkpoint: Option<usize>,
    /// Look for `<path>-wal` when no WAL is given
    pub(crate) discover_wal: bool,
    /// Memoize resolved pages
    pub(crate) page_cache: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            wal: None,
            checkpoint: None,
            discover_wal: true,
            page_cache: true,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay this WAL on top of the main file
    pub fn wal(mut self, wal: impl Into<FileSource>) -> Self {
        self.wal = Some(wal.into());
        self
    }

    /// Stop replay after the `checkpoint`-th commit; 0 ignores the WAL
    pub fn checkpoint(mut self, checkpoint: usize) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Open `<path>-wal` automatically for on-disk databases
    pub fn discover_wal(mut self, enabled: bool) -> Self {
        self.discover_wal = enabled;
        self
    }

    /// Keep resolved pages in memory for the life of the session
    pub fn page_cache(mut self, enabled: bool) -> Self {
        self.page_cache = enabled;
        self
    }

    /// Open the database with these options
    pub fn open(self, main: impl Into<FileSource>) -> Result<Database> {
        Database::open_with(main.into(), self)
    }

    /// WAL source to use for `main`: the explicit one, else a discovered
    /// non-empty sibling
    pub(crate) fn take_wal(&mut self, main: &FileSource) -> Option<FileSource> {
        if let Some(wal) = self.wal.take() {
            return Some(wal);
        }
        if !self.discover_wal {
            return None;
        }
        let path = wal_path(main.path()?);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                debug!(path = %path.display(), "discovered WAL sibling");
                Some(FileSource::Path(path))
            }
            Ok(_) => {
                debug!(path = %path.display(), "ignoring empty WAL sibling");
                None
            }
            Err(_) => None,
        }
    }
}

/// Path of the WAL belonging to database `path`
pub fn wal_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(WAL_SUFFIX);
    PathBuf::from(name)
}

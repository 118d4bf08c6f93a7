//! Database session
//!
//! A `Database` is one reconstruction of a database file: the main file,
//! optionally a WAL, and the checkpoint at which the WAL replay stops. The
//! object graph behind it is shared by every `Table`, `Rows` and `Row`
//! derived from it, so closing the database invalidates all of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::os::FileSource;
use crate::record::decode_record;
use crate::schema::{Encoding, Schema, SchemaEntry, SCHEMA_ROOT_PAGE};
use crate::storage::btree::TableCursor;
use crate::storage::checkpoint::CheckpointEngine;
use crate::storage::header::DbHeader;
use crate::storage::pager::Pager;
use crate::storage::wal::Wal;
use crate::types::{Pgno, RowId, Value};

use super::config::OpenOptions;
use super::table::{Table, Tables};

// ============================================================================
// Session
// ============================================================================

/// State shared by a database and everything derived from it
pub(crate) struct Session {
    pager: Arc<Pager>,
    wal: Option<Arc<Wal>>,
    engine: Arc<CheckpointEngine>,
    /// Text encoding in effect at the selected checkpoint
    encoding: Encoding,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::UseAfterClose)
        } else {
            Ok(())
        }
    }

    pub(crate) fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// A fresh cursor over the tree rooted at `root`
    pub(crate) fn cursor(&self, root: Pgno) -> Result<TableCursor> {
        self.check_open()?;
        Ok(TableCursor::new(self.engine.clone(), root))
    }

    /// Decode a record payload in the session's text encoding
    pub(crate) fn decode(&self, row_id: RowId, payload: &[u8]) -> Result<Vec<Value>> {
        decode_record(row_id, payload, self.encoding)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pager.close();
        if let Some(wal) = &self.wal {
            wal.close();
        }
        self.engine.clear_cache();
        debug!("database closed");
    }
}

// ============================================================================
// Database
// ============================================================================

/// A read-only view of a database at one checkpoint
pub struct Database {
    session: Arc<Session>,
}

impl Database {
    /// Open `main`, replaying `wal` up to `checkpoint`.
    ///
    /// With no WAL given, an on-disk database picks up its `<path>-wal`
    /// sibling. With no checkpoint given, the latest commit is used.
    pub fn open(
        main: impl Into<FileSource>,
        wal: Option<FileSource>,
        checkpoint: Option<usize>,
    ) -> Result<Database> {
        let mut options = OpenOptions::new();
        options.wal = wal;
        options.checkpoint = checkpoint;
        Self::open_with(main.into(), options)
    }

    pub(crate) fn open_with(main: FileSource, mut options: OpenOptions) -> Result<Database> {
        let explicit_wal = options.wal.is_some();
        let wal_source = options.take_wal(&main);
        let pager = Arc::new(Pager::open(main.open()?)?);

        // A damaged WAL only matters when frames are going to be replayed
        let optional = match options.checkpoint {
            Some(checkpoint) => checkpoint == 0,
            None => !explicit_wal,
        };
        let wal = match wal_source {
            Some(source) => match Self::open_wal(source, pager.page_size()) {
                Ok(wal) => Some(Arc::new(wal)),
                Err(e @ Error::InvalidWalHeader { .. }) if optional => {
                    warn!(error = %e, "ignoring unreadable WAL");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };
        if wal.is_none() && pager.header().is_wal_mode() {
            debug!("WAL-mode database opened without a WAL, reading the main file only");
        }
        let available = wal.as_ref().map(|w| w.checkpoint_count()).unwrap_or(0);
        let checkpoint = options.checkpoint.unwrap_or(available);

        let engine = Arc::new(CheckpointEngine::with_cache(
            pager.clone(),
            wal.clone(),
            checkpoint,
            options.page_cache,
        )?);

        // Page 1 at the checkpoint may carry a newer header than the main file
        let encoding = if engine.is_from_wal(1) {
            match DbHeader::parse(&engine.resolve_page(1)?) {
                Ok(header) => header.text_encoding,
                Err(e) => {
                    warn!(error = %e, "WAL copy of page 1 has an unreadable header");
                    pager.header().text_encoding
                }
            }
        } else {
            pager.header().text_encoding
        };

        debug!(
            checkpoint,
            available,
            page_count = engine.effective_page_count(),
            ?encoding,
            "database opened"
        );

        Ok(Database {
            session: Arc::new(Session {
                pager,
                wal,
                engine,
                encoding,
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn open_wal(source: FileSource, page_size: u32) -> Result<Wal> {
        Wal::open(source.open()?, page_size)
    }

    /// Header of the main database file
    pub fn header(&self) -> Result<&DbHeader> {
        self.session.check_open()?;
        Ok(self.session.pager.header())
    }

    /// The WAL being replayed, if any
    pub fn wal(&self) -> Result<Option<&Wal>> {
        self.session.check_open()?;
        Ok(self.session.wal.as_deref())
    }

    /// Database size in pages at the selected checkpoint
    pub fn page_count(&self) -> Result<Pgno> {
        self.session.check_open()?;
        Ok(self.session.engine.effective_page_count())
    }

    /// The selected checkpoint ordinal
    pub fn checkpoint(&self) -> Result<usize> {
        self.session.check_open()?;
        Ok(self.session.engine.checkpoint())
    }

    /// Number of commit boundaries available in the WAL
    pub fn checkpoint_count(&self) -> Result<usize> {
        self.session.check_open()?;
        Ok(self
            .session
            .wal
            .as_ref()
            .map(|w| w.checkpoint_count())
            .unwrap_or(0))
    }

    /// Text encoding of stored strings
    pub fn encoding(&self) -> Result<Encoding> {
        self.session.check_open()?;
        Ok(self.session.encoding())
    }

    /// Every entry of the schema table: tables, indexes, views, triggers
    pub fn schema(&self) -> Result<Schema> {
        let mut entries = Vec::new();
        for cell in self.session.cursor(SCHEMA_ROOT_PAGE)? {
            let cell = cell?;
            let entry = self
                .session
                .decode(cell.row_id, &cell.payload)
                .and_then(|values| SchemaEntry::from_values(cell.row_id, &values));
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e @ Error::CorruptRecord { .. }) => {
                    warn!(error = %e, "skipping unreadable schema row");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Schema::new(entries))
    }

    /// Lazily iterate the tables of the schema
    pub fn tables(&self) -> Result<Tables> {
        Tables::new(self.session.clone())
    }

    /// Look up a table by name, ignoring ASCII case
    pub fn table(&self, name: &str) -> Result<Table> {
        for table in self.tables()? {
            let table = match table {
                Ok(table) => table,
                Err(e @ Error::CorruptRecord { .. }) => {
                    warn!(error = %e, "skipping unreadable schema row");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if table.name().eq_ignore_ascii_case(name) {
                return Ok(table);
            }
        }
        Err(Error::TableNotFound {
            name: name.to_string(),
        })
    }

    /// Release file handles and cached pages.
    ///
    /// Every later call on this database or anything derived from it fails
    /// with `UseAfterClose`.
    pub fn close(&self) {
        self.session.close();
    }

    pub fn is_closed(&self) -> bool {
        self.session.check_open().is_err()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("checkpoint", &self.session.engine.checkpoint())
            .field("page_count", &self.session.engine.effective_page_count())
            .field("wal", &self.session.wal.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

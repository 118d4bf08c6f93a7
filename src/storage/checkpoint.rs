//! Checkpoint engine
//!
//! Resolves "which version of page N is current" at a chosen checkpoint:
//! the last WAL frame for N up to and including the chosen commit boundary,
//! or the main file's image when no such frame exists. Frames after the
//! boundary are invisible. The frame lookup table is built once at
//! construction; nothing mutates afterwards except the page cache.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::storage::pager::Pager;
use crate::storage::pcache::{PageCache, PageRef};
use crate::storage::wal::Wal;
use crate::types::Pgno;

/// Page resolution at a fixed checkpoint
pub struct CheckpointEngine {
    pager: Arc<Pager>,
    wal: Option<Arc<Wal>>,
    checkpoint: usize,
    /// Page number -> index of the last visible frame for that page
    frame_for_page: HashMap<Pgno, usize>,
    page_count: Pgno,
    cache: PageCache,
}

impl CheckpointEngine {
    /// Build the engine for checkpoint `checkpoint` (0 ignores the WAL)
    pub fn new(pager: Arc<Pager>, wal: Option<Arc<Wal>>, checkpoint: usize) -> Result<Self> {
        Self::with_cache(pager, wal, checkpoint, true)
    }

    /// Build the engine, choosing whether resolved pages are memoized
    pub fn with_cache(
        pager: Arc<Pager>,
        wal: Option<Arc<Wal>>,
        checkpoint: usize,
        cache_pages: bool,
    ) -> Result<Self> {
        let mut frame_for_page = HashMap::new();
        let page_count = match (&wal, checkpoint) {
            (_, 0) => pager.page_count(),
            (None, requested) => {
                return Err(Error::CheckpointOutOfRange {
                    requested,
                    available: 0,
                })
            }
            (Some(wal), _) => {
                let visible = wal.frames_through(checkpoint)?;
                for frame in visible {
                    // Later frames shadow earlier ones
                    frame_for_page.insert(frame.header.pgno, frame.index);
                }
                wal.db_size_at(checkpoint)?
            }
        };

        debug!(
            checkpoint,
            page_count,
            wal_pages = frame_for_page.len(),
            "checkpoint engine ready"
        );

        Ok(CheckpointEngine {
            pager,
            wal,
            checkpoint,
            frame_for_page,
            page_count,
            cache: PageCache::new(cache_pages),
        })
    }

    /// The selected checkpoint ordinal
    pub fn checkpoint(&self) -> usize {
        self.checkpoint
    }

    /// Database size in pages at the selected checkpoint
    pub fn effective_page_count(&self) -> Pgno {
        self.page_count
    }

    /// Page size in bytes
    pub fn page_size(&self) -> u32 {
        self.pager.page_size()
    }

    /// Usable bytes per page
    pub fn usable_size(&self) -> u32 {
        self.pager.usable_size()
    }

    /// The underlying page store
    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Whether page `pgno` is served from the WAL at this checkpoint
    pub fn is_from_wal(&self, pgno: Pgno) -> bool {
        self.frame_for_page.contains_key(&pgno)
    }

    /// The current image of page `pgno` at this checkpoint
    pub fn resolve_page(&self, pgno: Pgno) -> Result<PageRef> {
        if let Some(page) = self.cache.fetch(pgno) {
            return Ok(page);
        }

        let data = match (self.frame_for_page.get(&pgno), &self.wal) {
            (Some(&frame), Some(wal)) => {
                trace!(pgno, frame, "page resolved from WAL");
                wal.read_frame_page(frame)?
            }
            _ => {
                trace!(pgno, "page resolved from main file");
                self.pager.read_page(pgno)?
            }
        };
        Ok(self.cache.insert(pgno, data))
    }

    /// Drop memoized pages
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

//! Resolved-page cache
//!
//! Every traversal that crosses an interior page resolves it again, so the
//! checkpoint engine memoizes resolved images for the lifetime of a session.
//! Entries are immutable page images shared behind `Arc`; the cache is
//! cleared when the session closes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::Pgno;

/// Shared page image
pub type PageRef = Arc<[u8]>;

/// Memoized page images keyed by page number
#[derive(Default)]
pub struct PageCache {
    pages: RwLock<HashMap<Pgno, PageRef>>,
    enabled: bool,
}

impl PageCache {
    /// Create a cache; a disabled cache never stores anything
    pub fn new(enabled: bool) -> Self {
        PageCache {
            pages: RwLock::new(HashMap::new()),
            enabled,
        }
    }

    /// Look up a cached page
    pub fn fetch(&self, pgno: Pgno) -> Option<PageRef> {
        if !self.enabled {
            return None;
        }
        self.pages.read().ok()?.get(&pgno).cloned()
    }

    /// Store a page and return the shared image
    pub fn insert(&self, pgno: Pgno, data: Vec<u8>) -> PageRef {
        let page: PageRef = Arc::from(data);
        if self.enabled {
            if let Ok(mut pages) = self.pages.write() {
                pages.entry(pgno).or_insert_with(|| page.clone());
            }
        }
        page
    }

    /// Number of cached pages
    pub fn page_count(&self) -> usize {
        self.pages.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Drop every cached page
    pub fn clear(&self) {
        if let Ok(mut pages) = self.pages.write() {
            pages.clear();
        }
    }
}

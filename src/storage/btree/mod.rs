//! Table B-tree traversal
//!
//! `TableCursor` walks a table B-tree in ascending row id order. Interior
//! pages are kept on an explicit stack together with the next child slot to
//! descend into, so the walk is lazy and never recurses. Every page read goes
//! through the checkpoint engine, which decides whether the image comes from
//! the WAL or the main file.

pub mod encoding;
mod types;

use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::storage::checkpoint::CheckpointEngine;
use crate::types::{Pgno, RowId};

pub use encoding::{read_u16, read_u32, read_varint, varint_len, write_varint};
pub use types::{
    BtreePage, LeafCell, PageFlags, PageLimits, PageType, BTCURSOR_MAX_DEPTH, CELL_PTR_SIZE,
    MIN_EMBEDDED, PAGE_HEADER_SIZE_INTERIOR, PAGE_HEADER_SIZE_LEAF,
};

/// One table row as stored: row id plus the reassembled record payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub row_id: RowId,
    pub payload: Vec<u8>,
}

/// A page on the traversal stack and the next slot to visit
struct StackEntry {
    page: BtreePage,
    next: u16,
}

/// Lazy in-order iterator over the cells of one table B-tree
pub struct TableCursor {
    engine: Arc<CheckpointEngine>,
    root: Pgno,
    stack: Vec<StackEntry>,
    started: bool,
    done: bool,
}

impl TableCursor {
    /// Position a cursor before the first row of the tree rooted at `root`
    pub fn new(engine: Arc<CheckpointEngine>, root: Pgno) -> Self {
        Self {
            engine,
            root,
            stack: Vec::new(),
            started: false,
            done: false,
        }
    }

    /// Root page of the tree being walked
    pub fn root(&self) -> Pgno {
        self.root
    }

    /// Current depth of the traversal stack
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn limits(&self, pgno: Pgno) -> PageLimits {
        PageLimits::for_page(pgno, self.engine.page_size(), self.engine.usable_size())
    }

    fn load_page(&self, pgno: Pgno, parent: Option<Pgno>) -> Result<BtreePage> {
        let page_count = self.engine.effective_page_count();
        if pgno == 0 || pgno > page_count {
            return Err(Error::corrupt_page(
                parent.unwrap_or(pgno),
                format!("child page {} outside 1..={}", pgno, page_count),
            ));
        }
        let data = self.engine.resolve_page(pgno)?;
        let page = BtreePage::parse(pgno, data, self.limits(pgno))?;
        if !page.page_type.is_table() {
            return Err(Error::corrupt_page(
                pgno,
                format!("{:?} page inside a table b-tree", page.page_type),
            ));
        }
        trace!(pgno, page_type = ?page.page_type, cells = page.n_cell, "loaded b-tree page");
        Ok(page)
    }

    fn push(&mut self, pgno: Pgno, parent: Option<Pgno>) -> Result<()> {
        if self.stack.len() >= BTCURSOR_MAX_DEPTH {
            return Err(Error::corrupt_page(
                parent.unwrap_or(pgno),
                format!("b-tree deeper than {} levels", BTCURSOR_MAX_DEPTH),
            ));
        }
        let page = self.load_page(pgno, parent)?;
        self.stack.push(StackEntry { page, next: 0 });
        Ok(())
    }

    /// Read the payload of a leaf cell, following its overflow chain
    fn read_payload(&self, page: &BtreePage, cell: &LeafCell) -> Result<Vec<u8>> {
        let page_count = self.engine.effective_page_count();
        let content = page.limits.overflow_content();

        // Every overflow page of the database could belong to this cell, no more
        let local_len = cell.local.len() as u64;
        let reachable = local_len + page_count as u64 * content as u64;
        if cell.payload_size > reachable {
            return Err(Error::corrupt_page(
                page.pgno,
                format!(
                    "row {} declares {} payload bytes, at most {} are reachable",
                    cell.row_id, cell.payload_size, reachable
                ),
            ));
        }
        let expected = cell.payload_size as usize;
        let mut payload = Vec::with_capacity(expected);
        payload.extend_from_slice(&page.data[cell.local.clone()]);

        let Some(mut next) = cell.overflow else {
            return Ok(payload);
        };

        let mut hops: u32 = 0;
        while payload.len() < expected {
            if next == 0 || next > page_count {
                return Err(Error::TruncatedOverflowChain {
                    pgno: page.pgno,
                    row_id: cell.row_id,
                    expected,
                    collected: payload.len(),
                });
            }
            hops += 1;
            if hops > page_count {
                return Err(Error::corrupt_page(
                    page.pgno,
                    format!("overflow chain for row {} loops", cell.row_id),
                ));
            }

            let overflow = self.engine.resolve_page(next)?;
            let take = content.min(expected - payload.len());
            let body = overflow.get(4..4 + take).ok_or_else(|| {
                Error::corrupt_page(next, "overflow page shorter than its content")
            })?;
            payload.extend_from_slice(body);
            next = read_u32(&overflow, 0).unwrap_or(0);
        }
        Ok(payload)
    }

    fn step(&mut self) -> Result<Option<Cell>> {
        if !self.started {
            self.started = true;
            self.push(self.root, None)?;
        }

        loop {
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };
            let slot = top.next;

            if top.page.is_leaf() {
                if slot < top.page.n_cell {
                    top.next += 1;
                    let page = top.page.clone();
                    let cell = page.leaf_cell(slot)?;
                    let payload = self.read_payload(&page, &cell)?;
                    return Ok(Some(Cell {
                        row_id: cell.row_id,
                        payload,
                    }));
                }
            } else if slot <= top.page.n_cell {
                top.next += 1;
                let parent = top.page.pgno;
                let child = top.page.child_pgno(slot)?;
                self.push(child, Some(parent))?;
                continue;
            }
            self.stack.pop();
        }
    }
}

impl Iterator for TableCursor {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(cell)) => Some(Ok(cell)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for TableCursor {}

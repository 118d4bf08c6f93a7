//! B-tree page layout: page types, payload limits, and parsed page headers

use std::ops::Range;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::storage::header::DB_HEADER_SIZE;
use crate::storage::pcache::PageRef;
use crate::types::{Pgno, RowId};

use super::encoding::{read_u16, read_u32, read_varint};

pub const PAGE_HEADER_SIZE_LEAF: usize = 8;
pub const PAGE_HEADER_SIZE_INTERIOR: usize = 12;
pub const CELL_PTR_SIZE: usize = 2;
pub const MIN_EMBEDDED: u32 = 32;
pub const BTCURSOR_MAX_DEPTH: usize = 20;

bitflags! {
    /// Flag bits of the page type byte
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        const INTKEY = 0x01;
        const ZERODATA = 0x02;
        const LEAFDATA = 0x04;
        const LEAF = 0x08;
    }
}

/// The four B-tree page kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    IndexInterior = 0x02,
    TableInterior = 0x05,
    IndexLeaf = 0x0a,
    TableLeaf = 0x0d,
}

impl PageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let flags = PageFlags::from_bits(byte)?;
        if flags == PageFlags::INTKEY | PageFlags::LEAFDATA | PageFlags::LEAF {
            Some(PageType::TableLeaf)
        } else if flags == PageFlags::INTKEY | PageFlags::LEAFDATA {
            Some(PageType::TableInterior)
        } else if flags == PageFlags::ZERODATA | PageFlags::LEAF {
            Some(PageType::IndexLeaf)
        } else if flags == PageFlags::ZERODATA {
            Some(PageType::IndexInterior)
        } else {
            None
        }
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self as u8)
    }

    pub fn is_leaf(self) -> bool {
        self.flags().contains(PageFlags::LEAF)
    }

    pub fn is_table(self) -> bool {
        self.flags().contains(PageFlags::INTKEY)
    }

    pub fn header_size(self) -> usize {
        if self.is_leaf() {
            PAGE_HEADER_SIZE_LEAF
        } else {
            PAGE_HEADER_SIZE_INTERIOR
        }
    }
}

/// Page geometry and payload thresholds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLimits {
    pub page_size: u32,
    pub usable_size: u32,
    pub header_offset: usize,
}

impl PageLimits {
    pub fn new(page_size: u32, usable_size: u32) -> Self {
        Self {
            page_size,
            usable_size,
            header_offset: 0,
        }
    }

    /// Limits for page `pgno`; page 1 carries the database header first
    pub fn for_page(pgno: Pgno, page_size: u32, usable_size: u32) -> Self {
        Self {
            page_size,
            usable_size,
            header_offset: if pgno == 1 { DB_HEADER_SIZE } else { 0 },
        }
    }

    pub fn header_start(&self) -> usize {
        self.header_offset
    }

    pub fn usable_end(&self) -> usize {
        self.usable_size as usize
    }

    /// Largest payload a table leaf cell keeps entirely on the page
    pub fn max_local_leaf(&self) -> u32 {
        self.usable_size.saturating_sub(35)
    }

    /// Smallest local prefix of a spilled payload
    pub fn min_local(&self) -> u32 {
        (self.usable_size.saturating_sub(12) * MIN_EMBEDDED / 255).saturating_sub(23)
    }

    /// Content bytes carried by one overflow page
    pub fn overflow_content(&self) -> usize {
        self.usable_size.saturating_sub(4) as usize
    }

    /// Bytes of a `payload_size` payload stored in a table leaf cell
    pub fn local_payload(&self, payload_size: u64) -> usize {
        let max_local = self.max_local_leaf() as u64;
        if payload_size <= max_local {
            return payload_size as usize;
        }
        let min_local = self.min_local() as u64;
        let surplus = min_local + (payload_size - min_local) % (self.usable_size as u64 - 4);
        if surplus <= max_local {
            surplus as usize
        } else {
            min_local as usize
        }
    }
}

/// A leaf-table cell with its payload location resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafCell {
    pub row_id: RowId,
    /// Declared total payload size
    pub payload_size: u64,
    /// Local payload bytes within the page image
    pub local: Range<usize>,
    /// First overflow page, when the payload spills
    pub overflow: Option<Pgno>,
}

/// A parsed B-tree page header over a shared page image
#[derive(Clone, Debug)]
pub struct BtreePage {
    pub pgno: Pgno,
    pub data: PageRef,
    pub page_type: PageType,
    pub limits: PageLimits,
    pub n_cell: u16,
    pub cell_offset: usize,
    pub rightmost_ptr: Option<Pgno>,
}

impl BtreePage {
    pub fn parse(pgno: Pgno, data: PageRef, limits: PageLimits) -> Result<Self> {
        let header_start = limits.header_start();
        let type_byte = *data
            .get(header_start)
            .ok_or_else(|| Error::corrupt_page(pgno, "page shorter than its header"))?;
        let page_type = PageType::from_byte(type_byte).ok_or_else(|| {
            Error::corrupt_page(pgno, format!("unknown page type 0x{:02x}", type_byte))
        })?;
        let header_size = page_type.header_size();
        if data.len() < header_start + header_size {
            return Err(Error::corrupt_page(pgno, "page shorter than its header"));
        }

        let n_cell = read_u16(&data, header_start + 3)
            .ok_or_else(|| Error::corrupt_page(pgno, "missing cell count"))?;
        // Largest cell count a page of this size can hold
        let max_cells = limits.page_size.saturating_sub(8) / 6;
        if n_cell as u32 > max_cells {
            return Err(Error::corrupt_page(
                pgno,
                format!("cell count {} exceeds page capacity", n_cell),
            ));
        }
        let ptr_array_end = header_start + header_size + n_cell as usize * CELL_PTR_SIZE;
        if ptr_array_end > limits.usable_end() {
            return Err(Error::corrupt_page(pgno, "cell pointer array overruns page"));
        }

        let raw_offset = read_u16(&data, header_start + 5).unwrap_or(0) as usize;
        let cell_offset = if raw_offset == 0 { 65536 } else { raw_offset };
        let rightmost_ptr = if page_type.is_leaf() {
            None
        } else {
            read_u32(&data, header_start + 8)
        };

        Ok(Self {
            pgno,
            data,
            page_type,
            limits,
            n_cell,
            cell_offset,
            rightmost_ptr,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.page_type.is_leaf()
    }

    /// Offset of cell `index` within the page
    pub fn cell_ptr(&self, index: u16) -> Result<usize> {
        if index >= self.n_cell {
            return Err(self.corrupt(format!("cell {} of {} requested", index, self.n_cell)));
        }
        let offset = self.limits.header_start()
            + self.page_type.header_size()
            + index as usize * CELL_PTR_SIZE;
        let ptr = read_u16(&self.data, offset)
            .ok_or_else(|| self.corrupt("cell pointer array truncated"))? as usize;

        let cell_first = self.limits.header_start()
            + self.page_type.header_size()
            + self.n_cell as usize * CELL_PTR_SIZE;
        let cell_last = self.limits.usable_end().saturating_sub(4);
        if ptr < cell_first || ptr > cell_last {
            return Err(self.corrupt(format!("cell pointer {} outside content area", ptr)));
        }
        Ok(ptr)
    }

    /// Child page for slot `index`; slot `n_cell` is the rightmost pointer
    pub fn child_pgno(&self, index: u16) -> Result<Pgno> {
        if self.is_leaf() {
            return Err(self.corrupt("leaf page has no children"));
        }
        if index == self.n_cell {
            return self
                .rightmost_ptr
                .ok_or_else(|| self.corrupt("missing rightmost pointer"));
        }
        let cell = self.cell_ptr(index)?;
        read_u32(&self.data, cell).ok_or_else(|| self.corrupt("child pointer truncated"))
    }

    /// Parse leaf-table cell `index`
    pub fn leaf_cell(&self, index: u16) -> Result<LeafCell> {
        if self.page_type != PageType::TableLeaf {
            return Err(self.corrupt("not a table leaf page"));
        }
        let start = self.cell_ptr(index)?;
        let (payload_size, n1) = read_varint(&self.data, start)
            .ok_or_else(|| self.corrupt("payload size truncated"))?;
        let (row_id, n2) = read_varint(&self.data, start + n1)
            .ok_or_else(|| self.corrupt("row id truncated"))?;
        let payload_start = start + n1 + n2;

        let local_len = self.limits.local_payload(payload_size);
        let local = payload_start..payload_start + local_len;
        let spills = (local_len as u64) < payload_size;
        let cell_end = local.end + if spills { 4 } else { 0 };
        if cell_end > self.limits.usable_end() {
            return Err(self.corrupt(format!(
                "cell {} with {} byte payload overruns page",
                index, payload_size
            )));
        }

        let overflow = if spills {
            read_u32(&self.data, local.end)
        } else {
            None
        };

        Ok(LeafCell {
            row_id: row_id as RowId,
            payload_size,
            local,
            overflow,
        })
    }

    fn corrupt(&self, message: impl Into<String>) -> Error {
        Error::corrupt_page(self.pgno, message)
    }
}

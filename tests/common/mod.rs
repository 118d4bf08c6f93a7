//! Fixture builder for integration tests.
//!
//! Writes database images page by page (header, schema table, table
//! B-trees with interior levels and overflow chains) and WAL files whose
//! frames carry real checksum chains. Nothing here goes through the library
//! under test.

#![allow(dead_code)]

use std::collections::BTreeMap;

use sqlite_recon::Value;

pub const WAL_MAGIC_LE: u32 = 0x377f0682;
pub const WAL_MAGIC_BE: u32 = 0x377f0683;

// ============================================================================
// Varints and records
// ============================================================================

pub fn put_varint(out: &mut Vec<u8>, value: u64) {
    if value > 0x00ff_ffff_ffff_ffff {
        let mut buf = [0u8; 9];
        buf[8] = value as u8;
        let mut v = value >> 8;
        for i in (0..8).rev() {
            buf[i] = ((v & 0x7f) | 0x80) as u8;
            v >>= 7;
        }
        out.extend_from_slice(&buf);
        return;
    }
    let mut groups = vec![(value & 0x7f) as u8];
    let mut v = value >> 7;
    while v != 0 {
        groups.push(((v & 0x7f) | 0x80) as u8);
        v >>= 7;
    }
    groups.reverse();
    out.extend_from_slice(&groups);
}

/// Text encodings as stored in the header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8 = 1,
    Utf16le = 2,
    Utf16be = 3,
}

fn encode_text(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Utf16le => text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(),
        TextEncoding::Utf16be => text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect(),
    }
}

fn int_body(v: i64) -> (u64, Vec<u8>) {
    match v {
        0 => (8, vec![]),
        1 => (9, vec![]),
        _ => {
            for (code, width) in [(1u64, 1usize), (2, 2), (3, 3), (4, 4), (5, 6)] {
                let bits = width * 8;
                if v >= -(1i64 << (bits - 1)) && v < (1i64 << (bits - 1)) {
                    return (code, v.to_be_bytes()[8 - width..].to_vec());
                }
            }
            (6, v.to_be_bytes().to_vec())
        }
    }
}

/// Encode values in the record format
pub fn encode_record(values: &[Value], encoding: TextEncoding) -> Vec<u8> {
    let mut types = Vec::new();
    let mut body = Vec::new();
    for value in values {
        let (code, bytes) = match value {
            Value::Null => (0, vec![]),
            Value::Integer(v) => int_body(*v),
            Value::Float(f) => (7, f.to_be_bytes().to_vec()),
            Value::Text(s) => {
                let bytes = encode_text(s, encoding);
                (13 + 2 * bytes.len() as u64, bytes)
            }
            Value::Blob(b) => (12 + 2 * b.len() as u64, b.clone()),
        };
        put_varint(&mut types, code);
        body.extend_from_slice(&bytes);
    }
    // Header size counts its own varint
    let mut header_len = types.len() + 1;
    if header_len > 127 {
        header_len += 1;
    }
    let mut out = Vec::new();
    put_varint(&mut out, header_len as u64);
    out.extend_from_slice(&types);
    out.extend_from_slice(&body);
    out
}

/// Local bytes of a table-leaf payload of `p` bytes
pub fn local_payload(usable: usize, p: usize) -> usize {
    let x = usable - 35;
    let m = (usable - 12) * 32 / 255 - 23;
    if p <= x {
        return p;
    }
    let k = m + (p - m) % (usable - 4);
    if k <= x {
        k
    } else {
        m
    }
}

// ============================================================================
// Database images
// ============================================================================

struct ObjectDef {
    object_type: &'static str,
    name: String,
    tbl_name: String,
    root: u32,
    sql: Option<String>,
    rows: BTreeMap<i64, Vec<Value>>,
}

/// Builds successive states of one database
pub struct DbBuilder {
    pub page_size: usize,
    pub encoding: TextEncoding,
    pub change_counter: u32,
    /// Root pages are handed out up front so they stay put between states
    next_root: u32,
    objects: Vec<ObjectDef>,
}

impl DbBuilder {
    pub fn new(page_size: usize) -> Self {
        DbBuilder {
            page_size,
            encoding: TextEncoding::Utf8,
            change_counter: 0,
            next_root: 2,
            objects: Vec::new(),
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Add a table; returns its root page
    pub fn table(&mut self, name: &str, sql: &str) -> u32 {
        self.object("table", name, name, Some(sql), true)
    }

    /// Add an index entry with an empty index leaf as its root
    pub fn index(&mut self, name: &str, table: &str, sql: Option<&str>) -> u32 {
        self.object("index", name, table, sql, true)
    }

    /// Add a view entry (no root page)
    pub fn view(&mut self, name: &str, sql: &str) {
        self.object("view", name, name, Some(sql), false);
    }

    fn object(
        &mut self,
        object_type: &'static str,
        name: &str,
        tbl_name: &str,
        sql: Option<&str>,
        has_root: bool,
    ) -> u32 {
        let root = if has_root {
            self.next_root += 1;
            self.next_root - 1
        } else {
            0
        };
        self.objects.push(ObjectDef {
            object_type,
            name: name.to_string(),
            tbl_name: tbl_name.to_string(),
            root,
            sql: sql.map(str::to_string),
            rows: BTreeMap::new(),
        });
        root
    }

    fn object_mut(&mut self, table: &str) -> &mut ObjectDef {
        self.objects
            .iter_mut()
            .find(|t| t.name == table)
            .expect("unknown table")
    }

    pub fn insert(&mut self, table: &str, row_id: i64, values: Vec<Value>) {
        self.object_mut(table).rows.insert(row_id, values);
    }

    pub fn delete(&mut self, table: &str, row_id: i64) {
        self.object_mut(table).rows.remove(&row_id);
    }

    /// Insert a raw record payload, bypassing value encoding
    pub fn insert_raw(&mut self, table: &str, row_id: i64, record: Vec<u8>) {
        // Stored as a single blob marker and replaced at build time
        self.object_mut(table)
            .rows
            .insert(row_id, vec![Value::Blob(record), Value::Text(RAW_MARKER.into())]);
    }

    /// Render the current state; bumps the change counter
    pub fn build(&mut self) -> Vec<Vec<u8>> {
        self.change_counter += 1;
        let mut image = Image {
            page_size: self.page_size,
            pages: vec![vec![0u8; self.page_size]; self.next_root as usize - 1],
        };

        for object in &self.objects {
            match object.object_type {
                "table" => {
                    let cells: Vec<(i64, Vec<u8>)> = object
                        .rows
                        .iter()
                        .map(|(row_id, values)| (*row_id, self.record_for(values)))
                        .collect();
                    image.write_table(object.root, &cells);
                }
                "index" => {
                    image.page_mut(object.root)[0] = 0x0a;
                }
                _ => {}
            }
        }

        let schema: Vec<(i64, Vec<u8>)> = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, object)| {
                let values = vec![
                    Value::Text(object.object_type.to_string()),
                    Value::Text(object.name.clone()),
                    Value::Text(object.tbl_name.clone()),
                    Value::Integer(object.root as i64),
                    object.sql.clone().map(Value::Text).unwrap_or(Value::Null),
                ];
                (i as i64 + 1, encode_record(&values, self.encoding))
            })
            .collect();
        image.write_table(1, &schema);

        let page_count = image.pages.len() as u32;
        self.write_header(&mut image.pages[0], page_count);
        image.pages
    }

    fn record_for(&self, values: &[Value]) -> Vec<u8> {
        match values {
            [Value::Blob(raw), Value::Text(marker)] if marker == RAW_MARKER => raw.clone(),
            _ => encode_record(values, self.encoding),
        }
    }

    fn write_header(&self, page: &mut [u8], page_count: u32) {
        page[0..16].copy_from_slice(b"SQLite format 3\0");
        let size_field: u16 = if self.page_size == 65536 { 1 } else { self.page_size as u16 };
        page[16..18].copy_from_slice(&size_field.to_be_bytes());
        page[18] = 2;
        page[19] = 2;
        page[20] = 0;
        page[21] = 64;
        page[22] = 32;
        page[23] = 32;
        page[24..28].copy_from_slice(&self.change_counter.to_be_bytes());
        page[28..32].copy_from_slice(&page_count.to_be_bytes());
        page[40..44].copy_from_slice(&self.change_counter.to_be_bytes());
        page[44..48].copy_from_slice(&4u32.to_be_bytes());
        page[56..60].copy_from_slice(&(self.encoding as u32).to_be_bytes());
        page[92..96].copy_from_slice(&self.change_counter.to_be_bytes());
        page[96..100].copy_from_slice(&3045001u32.to_be_bytes());
    }
}

const RAW_MARKER: &str = "\u{0}raw-record\u{0}";

struct Image {
    page_size: usize,
    pages: Vec<Vec<u8>>,
}

impl Image {
    fn allocate(&mut self) -> u32 {
        self.pages.push(vec![0u8; self.page_size]);
        self.pages.len() as u32
    }

    fn page_mut(&mut self, pgno: u32) -> &mut Vec<u8> {
        &mut self.pages[pgno as usize - 1]
    }

    fn header_offset(pgno: u32) -> usize {
        if pgno == 1 {
            100
        } else {
            0
        }
    }

    /// Build a leaf cell, spilling to freshly allocated overflow pages
    fn leaf_cell(&mut self, row_id: i64, payload: &[u8]) -> Vec<u8> {
        let usable = self.page_size;
        let local = local_payload(usable, payload.len());
        let mut cell = Vec::new();
        put_varint(&mut cell, payload.len() as u64);
        put_varint(&mut cell, row_id as u64);
        cell.extend_from_slice(&payload[..local]);
        if local < payload.len() {
            let chunks: Vec<&[u8]> = payload[local..].chunks(usable - 4).collect();
            let pgnos: Vec<u32> = chunks.iter().map(|_| self.allocate()).collect();
            for (i, chunk) in chunks.iter().enumerate() {
                let next = pgnos.get(i + 1).copied().unwrap_or(0);
                let page = self.page_mut(pgnos[i]);
                page[0..4].copy_from_slice(&next.to_be_bytes());
                page[4..4 + chunk.len()].copy_from_slice(chunk);
            }
            cell.extend_from_slice(&pgnos[0].to_be_bytes());
        }
        cell
    }

    fn write_node(&mut self, pgno: u32, page_type: u8, cells: &[Vec<u8>], rightmost: Option<u32>) {
        let hdr = Self::header_offset(pgno);
        let header_size = if rightmost.is_some() { 12 } else { 8 };
        let page_size = self.page_size;
        let page = self.page_mut(pgno);
        page[hdr] = page_type;
        page[hdr + 1..hdr + 3].copy_from_slice(&0u16.to_be_bytes());
        page[hdr + 3..hdr + 5].copy_from_slice(&(cells.len() as u16).to_be_bytes());
        if let Some(right) = rightmost {
            page[hdr + 8..hdr + 12].copy_from_slice(&right.to_be_bytes());
        }
        let mut content = page_size;
        for (i, cell) in cells.iter().enumerate() {
            content -= cell.len();
            page[content..content + cell.len()].copy_from_slice(cell);
            let ptr = hdr + header_size + i * 2;
            page[ptr..ptr + 2].copy_from_slice(&(content as u16).to_be_bytes());
        }
        let stored = if content == 65536 { 0 } else { content as u16 };
        page[hdr + 5..hdr + 7].copy_from_slice(&stored.to_be_bytes());
        page[hdr + 7] = 0;
    }

    /// Pack cells into nodes of at most `capacity` bytes
    fn pack<T: Clone>(items: &[(Vec<u8>, T)], capacity: usize) -> Vec<Vec<(Vec<u8>, T)>> {
        let mut nodes = vec![Vec::new()];
        let mut used = 0;
        for item in items {
            let need = item.0.len() + 2;
            if used + need > capacity && !nodes.last().map_or(true, |n| n.is_empty()) {
                nodes.push(Vec::new());
                used = 0;
            }
            used += need;
            if let Some(node) = nodes.last_mut() {
                node.push(item.clone());
            }
        }
        nodes
    }

    /// Write a table B-tree rooted at `root`
    fn write_table(&mut self, root: u32, rows: &[(i64, Vec<u8>)]) {
        let cells: Vec<(Vec<u8>, i64)> = rows
            .iter()
            .map(|(row_id, payload)| (self.leaf_cell(*row_id, payload), *row_id))
            .collect();

        let root_capacity = self.page_size - Self::header_offset(root) - 8;
        if cells.iter().map(|c| c.0.len() + 2).sum::<usize>() <= root_capacity {
            let bodies: Vec<Vec<u8>> = cells.into_iter().map(|c| c.0).collect();
            self.write_node(root, 0x0d, &bodies, None);
            return;
        }

        // Leaves on fresh pages; each level records (pgno, max row id)
        let mut level: Vec<(u32, i64)> = Vec::new();
        for leaf in Self::pack(&cells, self.page_size - 8) {
            let pgno = self.allocate();
            let max = leaf.last().map(|c| c.1).unwrap_or(0);
            let bodies: Vec<Vec<u8>> = leaf.into_iter().map(|c| c.0).collect();
            self.write_node(pgno, 0x0d, &bodies, None);
            level.push((pgno, max));
        }

        loop {
            let entries: Vec<(Vec<u8>, (u32, i64))> = level
                .iter()
                .map(|(pgno, key)| {
                    let mut cell = pgno.to_be_bytes().to_vec();
                    put_varint(&mut cell, *key as u64);
                    (cell, (*pgno, *key))
                })
                .collect();

            let root_capacity = self.page_size - Self::header_offset(root) - 12;
            // The rightmost child needs no cell
            let fits_root = entries[..entries.len() - 1]
                .iter()
                .map(|e| e.0.len() + 2)
                .sum::<usize>()
                <= root_capacity;
            if fits_root {
                let (last, rest) = entries.split_last().map(|(l, r)| (l.1 .0, r)).unwrap();
                let bodies: Vec<Vec<u8>> = rest.iter().map(|e| e.0.clone()).collect();
                self.write_node(root, 0x05, &bodies, Some(last));
                return;
            }

            let mut next_level = Vec::new();
            for node in Self::pack(&entries, self.page_size - 12) {
                let pgno = self.allocate();
                let (last, rest) = node.split_last().unwrap();
                let bodies: Vec<Vec<u8>> = rest.iter().map(|e| e.0.clone()).collect();
                self.write_node(pgno, 0x05, &bodies, Some(last.1 .0));
                next_level.push((pgno, last.1 .1));
            }
            level = next_level;
        }
    }
}

/// Concatenate page images into a file image
pub fn file_image(pages: &[Vec<u8>]) -> Vec<u8> {
    pages.concat()
}

// ============================================================================
// WAL images
// ============================================================================

pub fn checksum(big_endian: bool, data: &[u8], mut s1: u32, mut s2: u32) -> (u32, u32) {
    for chunk in data.chunks_exact(8) {
        let word = |b: &[u8]| {
            let arr = [b[0], b[1], b[2], b[3]];
            if big_endian {
                u32::from_be_bytes(arr)
            } else {
                u32::from_le_bytes(arr)
            }
        };
        s1 = s1.wrapping_add(word(&chunk[0..4])).wrapping_add(s2);
        s2 = s2.wrapping_add(word(&chunk[4..8])).wrapping_add(s1);
    }
    (s1, s2)
}

pub struct Frame {
    pub pgno: u32,
    pub db_size: u32,
    pub page: Vec<u8>,
    /// Salts written into the frame header, defaulting to the WAL's own
    pub salt: Option<[u32; 2]>,
}

/// Builds a WAL file frame by frame
pub struct WalBuilder {
    pub page_size: usize,
    pub big_endian: bool,
    pub salt: [u32; 2],
    pub checkpoint_seq: u32,
    pub frames: Vec<Frame>,
}

impl WalBuilder {
    pub fn new(page_size: usize) -> Self {
        WalBuilder {
            page_size,
            big_endian: false,
            salt: [0x1234_5678, 0x0bad_cafe],
            checkpoint_seq: 0,
            frames: Vec::new(),
        }
    }

    /// Append one frame
    pub fn frame(&mut self, pgno: u32, db_size: u32, page: Vec<u8>) {
        self.frames.push(Frame {
            pgno,
            db_size,
            page,
            salt: None,
        });
    }

    /// Append one commit taking the database from `before` to `after`;
    /// returns how many frames were written
    pub fn commit(&mut self, before: &[Vec<u8>], after: &[Vec<u8>]) -> usize {
        let changed: Vec<u32> = (0..after.len())
            .filter(|&i| before.get(i) != Some(&after[i]))
            .map(|i| i as u32 + 1)
            .collect();
        let count = changed.len();
        for (n, pgno) in changed.into_iter().enumerate() {
            let db_size = if n + 1 == count { after.len() as u32 } else { 0 };
            self.frame(pgno, db_size, after[pgno as usize - 1].clone());
        }
        count
    }

    /// Append frames for `pages` without a commit marker
    pub fn uncommitted(&mut self, pages: &[(u32, Vec<u8>)]) {
        for (pgno, page) in pages {
            self.frame(*pgno, 0, page.clone());
        }
    }

    pub fn magic(&self) -> u32 {
        if self.big_endian {
            WAL_MAGIC_BE
        } else {
            WAL_MAGIC_LE
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for word in [
            self.magic(),
            3007000,
            self.page_size as u32,
            self.checkpoint_seq,
            self.salt[0],
            self.salt[1],
        ] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        let mut sum = checksum(self.big_endian, &out, 0, 0);
        out.extend_from_slice(&sum.0.to_be_bytes());
        out.extend_from_slice(&sum.1.to_be_bytes());

        for frame in &self.frames {
            let salt = frame.salt.unwrap_or(self.salt);
            let mut header = Vec::with_capacity(24);
            for word in [frame.pgno, frame.db_size, salt[0], salt[1]] {
                header.extend_from_slice(&word.to_be_bytes());
            }
            sum = checksum(self.big_endian, &header[0..8], sum.0, sum.1);
            sum = checksum(self.big_endian, &frame.page, sum.0, sum.1);
            header.extend_from_slice(&sum.0.to_be_bytes());
            header.extend_from_slice(&sum.1.to_be_bytes());
            out.extend_from_slice(&header);
            out.extend_from_slice(&frame.page);
        }
        out
    }
}

/// Row values as a comparable tuple list for assertions
pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

pub fn int(v: i64) -> Value {
    Value::Integer(v)
}

//! Write-ahead log reader
//!
//! Parses a WAL file into the ordered run of frames that belong to the
//! current WAL generation. Validation is a fold over the frames carrying the
//! running checksum pair: the first frame that fails to chain (or carries
//! stale salts, or is cut short) marks the end of the log. That is the
//! normal shape of a WAL after a torn write, so it is not an error.

use std::collections::BTreeSet;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::os::VfsFile;
use crate::types::Pgno;

// ============================================================================
// Constants
// ============================================================================

/// WAL magic number (little endian checksums)
pub const WAL_MAGIC_LE: u32 = 0x377f0682;

/// WAL magic number (big endian checksums)
pub const WAL_MAGIC_BE: u32 = 0x377f0683;

/// WAL file format version
pub const WAL_VERSION: u32 = 3007000;

/// WAL header size in bytes
pub const WAL_HEADER_SIZE: usize = 32;

/// WAL frame header size in bytes
pub const WAL_FRAME_HEADER_SIZE: usize = 24;

// ============================================================================
// WAL File Header
// ============================================================================

/// WAL file header (32 bytes at start of WAL file, big-endian fields)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalHeader {
    /// Magic number (WAL_MAGIC_LE or WAL_MAGIC_BE)
    pub magic: u32,
    /// File format version
    pub version: u32,
    /// Database page size
    pub page_size: u32,
    /// Checkpoint sequence number
    pub checkpoint_seq: u32,
    /// Salt value 1
    pub salt1: u32,
    /// Salt value 2
    pub salt2: u32,
    /// Checksum part 1
    pub checksum1: u32,
    /// Checksum part 2
    pub checksum2: u32,
}

impl WalHeader {
    /// Check if checksum words are read big-endian
    pub fn is_big_endian(&self) -> bool {
        self.magic == WAL_MAGIC_BE
    }

    /// Parse and sanity-check the header against the main file page size
    pub fn parse(data: &[u8], db_page_size: u32) -> Result<Self> {
        if data.len() < WAL_HEADER_SIZE {
            return Err(invalid(format!(
                "header needs {} bytes, got {}",
                WAL_HEADER_SIZE,
                data.len()
            )));
        }
        let word = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        let hdr = WalHeader {
            magic: word(0),
            version: word(4),
            page_size: word(8),
            checkpoint_seq: word(12),
            salt1: word(16),
            salt2: word(20),
            checksum1: word(24),
            checksum2: word(28),
        };

        if hdr.magic != WAL_MAGIC_LE && hdr.magic != WAL_MAGIC_BE {
            return Err(invalid(format!("bad magic {:#010x}", hdr.magic)));
        }
        if hdr.version != WAL_VERSION {
            return Err(invalid(format!("unsupported version {}", hdr.version)));
        }
        if hdr.page_size != db_page_size {
            return Err(invalid(format!(
                "page size {} does not match database page size {}",
                hdr.page_size, db_page_size
            )));
        }
        Ok(hdr)
    }

    /// Whether the stored checksum covers the first 24 header bytes
    pub fn checksum_valid(&self, raw: &[u8]) -> bool {
        let (c1, c2) = wal_checksum(self.is_big_endian(), &raw[0..24], 0, 0);
        c1 == self.checksum1 && c2 == self.checksum2
    }
}

// ============================================================================
// WAL Frame Header
// ============================================================================

/// WAL frame header (24 bytes before each page in WAL)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalFrameHdr {
    /// Page number this frame contains
    pub pgno: Pgno,
    /// Database size in pages after commit (0 if not a commit frame)
    pub db_size: u32,
    /// Salt values (must match WAL header)
    pub salt: [u32; 2],
    /// Cumulative checksum
    pub checksum: [u32; 2],
}

impl WalFrameHdr {
    /// Check if this is a commit frame
    pub fn is_commit(&self) -> bool {
        self.db_size > 0
    }

    /// Deserialize from bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < WAL_FRAME_HEADER_SIZE {
            return None;
        }
        let word = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Some(WalFrameHdr {
            pgno: word(0),
            db_size: word(4),
            salt: [word(8), word(12)],
            checksum: [word(16), word(20)],
        })
    }
}

/// A validated frame and where its page image lives in the WAL file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalFrame {
    /// 0-based position in the WAL
    pub index: usize,
    /// Frame header
    pub header: WalFrameHdr,
    /// File offset of the page image
    pub page_offset: u64,
}

// ============================================================================
// WAL
// ============================================================================

/// Parsed write-ahead log
pub struct Wal {
    fd: Mutex<Option<Box<dyn VfsFile>>>,
    header: WalHeader,
    frames: Vec<WalFrame>,
    commit_boundaries: Vec<usize>,
    highest_page_num: Pgno,
}

/// Running state of the frame validation fold
struct ChecksumChain {
    big_endian: bool,
    salt: [u32; 2],
    checksum: [u32; 2],
}

impl ChecksumChain {
    /// Fold one frame into the chain; `None` means the frame does not belong
    fn step(&self, frame: &[u8]) -> Option<[u32; 2]> {
        let hdr = WalFrameHdr::from_bytes(frame)?;
        if hdr.salt != self.salt {
            return None;
        }
        let (c1, c2) = wal_checksum(self.big_endian, &frame[0..8], self.checksum[0], self.checksum[1]);
        let (c1, c2) = wal_checksum(self.big_endian, &frame[WAL_FRAME_HEADER_SIZE..], c1, c2);
        if [c1, c2] != hdr.checksum {
            return None;
        }
        Some([c1, c2])
    }
}

impl Wal {
    /// Parse a WAL file. `db_page_size` is the main file's page size.
    pub fn open(mut fd: Box<dyn VfsFile>, db_page_size: u32) -> Result<Self> {
        let mut hdr_buf = [0u8; WAL_HEADER_SIZE];
        let n = fd.read(&mut hdr_buf, 0)?;
        let header = WalHeader::parse(&hdr_buf[..n], db_page_size)?;

        let mut wal = Wal {
            fd: Mutex::new(None),
            header,
            frames: Vec::new(),
            commit_boundaries: Vec::new(),
            highest_page_num: 0,
        };

        if header.checksum_valid(&hdr_buf) {
            wal.scan_frames(fd.as_mut())?;
        } else {
            // SQLite treats such a WAL as empty
            warn!(
                salt1 = header.salt1,
                salt2 = header.salt2,
                "WAL header checksum mismatch, ignoring all frames"
            );
        }

        debug!(
            frames = wal.frames.len(),
            commits = wal.commit_boundaries.len(),
            highest_page = wal.highest_page_num,
            checkpoint_seq = header.checkpoint_seq,
            "parsed WAL"
        );

        wal.fd = Mutex::new(Some(fd));
        Ok(wal)
    }

    fn scan_frames(&mut self, fd: &mut dyn VfsFile) -> Result<()> {
        let page_size = self.header.page_size as usize;
        let frame_size = WAL_FRAME_HEADER_SIZE + page_size;
        let mut chain = ChecksumChain {
            big_endian: self.header.is_big_endian(),
            salt: [self.header.salt1, self.header.salt2],
            checksum: [self.header.checksum1, self.header.checksum2],
        };

        let mut offset = WAL_HEADER_SIZE as u64;
        let mut frame_buf = vec![0u8; frame_size];
        loop {
            let n = fd.read(&mut frame_buf, offset)?;
            if n < frame_size {
                if n > 0 {
                    debug!(offset, bytes = n, "partial frame at end of WAL");
                }
                break;
            }
            let Some(checksum) = chain.step(&frame_buf) else {
                debug!(
                    frame = self.frames.len(),
                    offset, "WAL frame does not chain, end of valid log"
                );
                break;
            };
            chain.checksum = checksum;

            let Some(header) = WalFrameHdr::from_bytes(&frame_buf) else {
                break;
            };
            let index = self.frames.len();
            self.frames.push(WalFrame {
                index,
                header,
                page_offset: offset + WAL_FRAME_HEADER_SIZE as u64,
            });
            self.highest_page_num = self.highest_page_num.max(header.pgno);
            if header.is_commit() {
                self.commit_boundaries.push(index);
            }

            offset += frame_size as u64;
        }
        Ok(())
    }

    /// The WAL file header
    pub fn header(&self) -> &WalHeader {
        &self.header
    }

    /// All valid frames, in log order
    pub fn frames(&self) -> &[WalFrame] {
        &self.frames
    }

    /// Frame indices of commit frames, in log order
    pub fn commit_boundaries(&self) -> &[usize] {
        &self.commit_boundaries
    }

    /// Number of checkpoints (commit boundaries) in the log
    pub fn checkpoint_count(&self) -> usize {
        self.commit_boundaries.len()
    }

    /// Highest page number written by any valid frame
    pub fn highest_page_num(&self) -> Pgno {
        self.highest_page_num
    }

    /// Frames visible at checkpoint `checkpoint` (0 = none)
    pub fn frames_through(&self, checkpoint: usize) -> Result<&[WalFrame]> {
        if checkpoint == 0 {
            return Ok(&[]);
        }
        let boundary = self
            .commit_boundaries
            .get(checkpoint - 1)
            .ok_or(Error::CheckpointOutOfRange {
                requested: checkpoint,
                available: self.commit_boundaries.len(),
            })?;
        Ok(&self.frames[..=*boundary])
    }

    /// Database size in pages recorded at a checkpoint (1-based)
    pub fn db_size_at(&self, checkpoint: usize) -> Result<Pgno> {
        let frames = self.frames_through(checkpoint)?;
        Ok(frames.last().map(|f| f.header.db_size).unwrap_or(0))
    }

    /// Pages written by frames after checkpoint `from` up to checkpoint `to`
    pub fn pages_in_window(&self, from: usize, to: usize) -> Result<BTreeSet<Pgno>> {
        let start = self.frames_through(from)?.len();
        let end = self.frames_through(to)?.len();
        Ok(self.frames[start.min(end)..end]
            .iter()
            .map(|f| f.header.pgno)
            .collect())
    }

    /// Read the page image stored in frame `index`
    pub fn read_frame_page(&self, index: usize) -> Result<Vec<u8>> {
        let frame = self.frames.get(index).ok_or_else(|| {
            Error::corrupt_page(
                0,
                format!("WAL frame {} of {} does not exist", index, self.frames.len()),
            )
        })?;
        let mut guard = self.fd.lock().map_err(|_| Error::UseAfterClose)?;
        let fd = guard.as_mut().ok_or(Error::UseAfterClose)?;

        let page_size = self.header.page_size as usize;
        let mut data = vec![0u8; page_size];
        let n = fd.read(&mut data, frame.page_offset)?;
        if n < page_size {
            return Err(Error::TruncatedFile {
                pgno: frame.header.pgno,
                offset: frame.page_offset,
                needed: page_size,
                available: fd.file_size()?,
            });
        }
        Ok(data)
    }

    /// Release the file handle
    pub fn close(&self) {
        if let Ok(mut guard) = self.fd.lock() {
            guard.take();
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidWalHeader {
        message: message.into(),
    }
}

// ============================================================================
// Checksum Functions
// ============================================================================

/// Calculate WAL checksum
///
/// This implements SQLite's WAL checksum algorithm. The checksum is computed
/// over pairs of 32-bit words, each read in the byte order selected by the
/// WAL magic number.
pub fn wal_checksum(big_endian: bool, data: &[u8], init1: u32, init2: u32) -> (u32, u32) {
    let mut s1 = init1;
    let mut s2 = init2;

    for chunk in data.chunks_exact(8) {
        let (w1, w2) = if big_endian {
            (
                u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
            )
        } else {
            (
                u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
            )
        };

        s1 = s1.wrapping_add(w1).wrapping_add(s2);
        s2 = s2.wrapping_add(w2).wrapping_add(s1);
    }

    (s1, s2)
}

// ============================================================================
// Tests
// ============================================================================

//! Virtual file abstraction
//!
//! The reconstruction engine only ever reads at absolute offsets, so the
//! file interface is a positional `read` plus a size query. Any seekable
//! reader qualifies, which lets callers hand in either a path or an
//! already-open stream (a carved image, an in-memory buffer, ...).

use std::fs::File;
use std::io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Positional read access to a database or WAL image
pub trait VfsFile: Send {
    /// Read into `buf` starting at `offset`, returns bytes read.
    ///
    /// Short reads only happen at end of file; the unread tail of `buf`
    /// is zero-filled.
    fn read(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Current file size in bytes
    fn file_size(&mut self) -> io::Result<u64>;
}

impl<T: Read + Seek + Send> VfsFile for T {
    fn read(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match Read::read(self, &mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        // Zero-fill short reads (SQLite convention)
        if filled < buf.len() {
            buf[filled..].fill(0);
        }
        Ok(filled)
    }

    fn file_size(&mut self) -> io::Result<u64> {
        let current = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(current))?;
        Ok(end)
    }
}

/// Where a database or WAL image comes from
pub enum FileSource {
    /// A file on disk, opened read-only
    Path(PathBuf),
    /// An already-open stream
    Stream(Box<dyn VfsFile>),
}

impl FileSource {
    /// Wrap any seekable reader
    pub fn reader<R: Read + Seek + Send + 'static>(reader: R) -> Self {
        FileSource::Stream(Box::new(reader))
    }

    /// Wrap an in-memory image
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        FileSource::reader(Cursor::new(data.into()))
    }

    /// The path, if this source names a file on disk
    pub fn path(&self) -> Option<&Path> {
        match self {
            FileSource::Path(p) => Some(p),
            FileSource::Stream(_) => None,
        }
    }

    /// Open the source for reading
    pub fn open(self) -> Result<Box<dyn VfsFile>> {
        match self {
            FileSource::Path(path) => {
                let file = File::open(&path)?;
                Ok(Box::new(file))
            }
            FileSource::Stream(stream) => Ok(stream),
        }
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            FileSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        FileSource::Path(path)
    }
}

impl From<&Path> for FileSource {
    fn from(path: &Path) -> Self {
        FileSource::Path(path.to_path_buf())
    }
}

impl From<&PathBuf> for FileSource {
    fn from(path: &PathBuf) -> Self {
        FileSource::Path(path.clone())
    }
}

impl From<&str> for FileSource {
    fn from(path: &str) -> Self {
        FileSource::Path(PathBuf::from(path))
    }
}

impl From<File> for FileSource {
    fn from(file: File) -> Self {
        FileSource::reader(file)
    }
}

impl From<Vec<u8>> for FileSource {
    fn from(data: Vec<u8>) -> Self {
        FileSource::bytes(data)
    }
}

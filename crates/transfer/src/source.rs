//! Readable file contents that chunks are sliced from.

use std::fmt;
use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Future returned by [`FileSource::read_range`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send + 'a>>;

/// Byte-range-readable file content.
///
/// Workers read each chunk lazily right before uploading it, so a queued
/// task only holds a handle to the source and its range.
pub trait FileSource: Send + Sync + fmt::Debug {
    /// Total size in bytes.
    fn len(&self) -> u64;

    /// Returns `true` for an empty file.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly `length` bytes starting at `offset`.
    fn read_range(&self, offset: u64, length: u64) -> ReadFuture<'_>;
}

fn out_of_bounds(offset: u64, length: u64, len: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("range {offset}+{length} exceeds source length {len}"),
    )
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// File content held in memory.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("len", &self.data.len())
            .finish()
    }
}

impl FileSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, offset: u64, length: u64) -> ReadFuture<'_> {
        Box::pin(async move {
            let end = offset
                .checked_add(length)
                .filter(|end| *end <= self.len())
                .ok_or_else(|| out_of_bounds(offset, length, self.len()))?;
            Ok(self.data[offset as usize..end as usize].to_vec())
        })
    }
}

// ---------------------------------------------------------------------------
// LocalFileSource
// ---------------------------------------------------------------------------

/// File on local disk. The size is captured when the source is opened.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
    len: u64,
}

impl LocalFileSource {
    /// Opens `path`, recording its current size.
    pub async fn open(path: &Path) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for LocalFileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(&self, offset: u64, length: u64) -> ReadFuture<'_> {
        Box::pin(async move {
            if offset.saturating_add(length) > self.len {
                return Err(out_of_bounds(offset, length, self.len));
            }
            let mut file = tokio::fs::File::open(&self.path).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut buf = vec![0u8; length as usize];
            file.read_exact(&mut buf).await?;
            Ok(buf)
        })
    }
}

use std::iter::FusedIterator;

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Error returned when a chunk checksum cannot be computed.
#[derive(Debug, thiserror::Error)]
#[error("checksum failed: {0}")]
pub struct ChecksumError(pub String);

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the lowercase hex digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Chunk splitting
// ---------------------------------------------------------------------------

/// Byte range of one chunk within its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    /// Zero-based position of the chunk.
    pub index: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Number of bytes in the chunk.
    pub length: u64,
}

impl ChunkRange {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// 1-based chunk number as sent on the wire.
    pub fn number(&self) -> u32 {
        self.index + 1
    }
}

/// Returns how many chunks a file of `file_size` bytes splits into.
///
/// An empty file still has one (empty) chunk so that it travels through
/// the same session/upload path as every other file.
pub fn chunk_count(file_size: u64, chunk_size: u64) -> Result<u32, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    let count = file_size.div_ceil(chunk_size).max(1);
    u32::try_from(count).map_err(|_| TransferError::TooManyChunks(count))
}

/// Splits `[0, file_size)` into consecutive ranges of at most `chunk_size`.
///
/// The returned iterator is cheap to clone, so the sequence can be
/// restarted from the beginning at any time.
pub fn split(file_size: u64, chunk_size: u64) -> Result<ChunkRanges, TransferError> {
    let total = chunk_count(file_size, chunk_size)?;
    Ok(ChunkRanges {
        file_size,
        chunk_size,
        next: 0,
        total,
    })
}

/// Iterator over the chunk ranges of one file.
#[derive(Debug, Clone)]
pub struct ChunkRanges {
    file_size: u64,
    chunk_size: u64,
    next: u32,
    total: u32,
}

impl ChunkRanges {
    /// Total number of chunks, independent of iteration state.
    pub fn total(&self) -> u32 {
        self.total
    }
}

impl Iterator for ChunkRanges {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        let offset = u64::from(index) * self.chunk_size;
        let length = self.chunk_size.min(self.file_size - offset);
        self.next += 1;
        Some(ChunkRange {
            index,
            offset,
            length,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkRanges {}
impl FusedIterator for ChunkRanges {}

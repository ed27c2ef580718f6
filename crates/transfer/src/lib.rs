//! Chunked upload building blocks: splitting, queueing and progress.
//!
//! Everything here is transport-agnostic. The `ledger-upload` crate drives
//! these pieces from its worker pool and intake controller.

mod chunked;
mod progress;
mod queue;
mod size;
mod source;
mod types;
mod validation;

pub use chunked::{ChecksumError, ChunkRange, ChunkRanges, checksum_bytes, chunk_count, split};
pub use progress::{
    AggregateProgress, ChunkRecord, ProgressSnapshot, ProgressTracker, SpeedCalculator,
};
pub use queue::TaskQueue;
pub use size::{format_bytes, parse_size_bytes};
pub use source::{FileSource, LocalFileSource, MemorySource, ReadFuture};
pub use types::{FileMeta, FileProgress, UploadTask};
pub use validation::{validate_destination_path, validate_file_name};

use ledger_protocol::UploadStatus;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("file needs {0} chunks, more than the API accepts")]
    TooManyChunks(u64),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("unknown tracking key: {0}")]
    UnknownKey(String),

    #[error("tracking key already in use: {0}")]
    DuplicateKey(String),

    #[error("invalid transition for {key}: {from:?} -> {to:?}")]
    InvalidTransition {
        key: String,
        from: UploadStatus,
        to: UploadStatus,
    },
}

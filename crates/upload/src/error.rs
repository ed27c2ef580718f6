//! Upload error types.

use std::time::Duration;

/// Errors produced by the upload pipeline.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("session error: {0}")]
    Session(String),

    #[error("chunk upload failed: {0}")]
    Chunk(String),

    #[error("{0}")]
    Checksum(#[from] ledger_transfer::ChecksumError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] ledger_transfer::TransferError),
}

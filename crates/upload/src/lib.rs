//! Chunked upload orchestration for the Ledger file manager.
//!
//! This crate implements the **upload pipeline**: files handed to
//! [`UploadOrchestrator::intake`] get a progress entry, an upload session
//! on the storage server, and one queued task per chunk. A bounded pool of
//! workers drains the queue, checksums and uploads each chunk, and reports
//! back to the shared progress tracker. The storage API is reached through
//! the [`UploadSessionClient`] trait so the pipeline can run against the
//! real HTTP endpoints ([`HttpSessionClient`]) or a mock.
//!
//! # Pipeline
//!
//! 1. **Intake**: register a `Pending` entry per file
//! 2. **Session**: begin an upload session (concurrently per file)
//! 3. **Enqueue**: split the file and queue one task per chunk
//! 4. **Upload**: workers checksum and send chunks
//! 5. **Complete**: hold the entry at 100%, then drop it and notify listeners

pub mod checksum;
pub mod client;
pub mod config;
mod context;
pub mod error;
pub mod http;
pub mod intake;
pub mod orchestrator;
pub mod pool;
pub mod scanner;
#[cfg(test)]
mod test_support;
pub mod types;

// Re-export primary types for convenience.
pub use checksum::{ChecksumProvider, Sha256Checksum};
pub use client::{ClientFuture, UploadSessionClient};
pub use config::UploadConfig;
pub use error::UploadError;
pub use http::HttpSessionClient;
pub use intake::IntakeController;
pub use orchestrator::UploadOrchestrator;
pub use pool::WorkerPool;
pub use scanner::{ScannedFile, detect_content_type, join_destination, scan_paths};
pub use types::{SessionInfo, UploadEvent, UploadFile};

use std::sync::Arc;

use ledger_protocol::UploadStatus;
use serde::Serialize;

use crate::chunked::ChunkRange;
use crate::source::FileSource;

/// One chunk of work: upload `chunk` of `source` into an open session.
///
/// Created by intake once the session exists, consumed exactly once by a
/// worker.
#[derive(Debug, Clone)]
pub struct UploadTask {
    /// Client-side key of the file's progress entry.
    pub tracking_key: String,
    /// Server-assigned file identifier.
    pub file_id: String,
    /// Server-assigned upload session identifier.
    pub session_id: String,
    pub file_name: String,
    /// Remote directory the file is uploaded into.
    pub destination: String,
    pub chunk: ChunkRange,
    pub total_chunks: u32,
    pub source: Arc<dyn FileSource>,
}

impl UploadTask {
    /// 1-based chunk number as sent on the wire.
    pub fn chunk_number(&self) -> u32 {
        self.chunk.number()
    }

    /// Reads this task's bytes from the source.
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        self.source
            .read_range(self.chunk.offset, self.chunk.length)
            .await
    }
}

/// Static description of a file registered with the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub file_name: String,
    pub total_chunks: u32,
    pub total_bytes: u64,
}

/// Upload progress of one file, keyed by its tracking key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub tracking_key: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    pub status: UploadStatus,
    pub total_chunks: u32,
    pub chunks_completed: u32,
    pub total_bytes: u64,
    pub bytes_uploaded: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl FileProgress {
    /// Creates a `Pending` entry with nothing uploaded.
    pub fn new(tracking_key: impl Into<String>, meta: FileMeta) -> Self {
        Self {
            tracking_key: tracking_key.into(),
            file_name: meta.file_name,
            file_id: String::new(),
            session_id: String::new(),
            status: UploadStatus::Pending,
            total_chunks: meta.total_chunks,
            chunks_completed: 0,
            total_bytes: meta.total_bytes,
            bytes_uploaded: 0,
            error: String::new(),
        }
    }

    /// Completed chunks as a whole percentage, rounded down.
    pub fn percent(&self) -> u8 {
        if self.total_chunks == 0 {
            return 0;
        }
        (u64::from(self.chunks_completed) * 100 / u64::from(self.total_chunks)) as u8
    }

    /// Returns `true` once every chunk has been recorded.
    pub fn is_complete(&self) -> bool {
        self.chunks_completed >= self.total_chunks
    }

    /// Bytes that still have to be uploaded.
    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.bytes_uploaded)
    }
}

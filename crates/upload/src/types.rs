//! Data types for the upload pipeline.

use std::path::Path;
use std::sync::Arc;

use ledger_protocol::CreateUploadResponse;
use ledger_transfer::{FileSource, LocalFileSource, MemorySource};

use crate::error::UploadError;
use crate::scanner::detect_content_type;

/// A user-selected file handed to intake.
///
/// Drag-and-drop and file-picker selections both end up as a list of
/// these.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub source: Arc<dyn FileSource>,
}

impl UploadFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        source: Arc<dyn FileSource>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            source,
        }
    }

    /// Wraps in-memory content.
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(name, content_type, Arc::new(MemorySource::new(data)))
    }

    /// Opens a local file, deriving the name and content type from its path.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("could not determine file name of {}", path.display()),
                ))
            })?;
        let source = LocalFileSource::open(path).await?;
        Ok(Self::new(
            name,
            detect_content_type(&path.to_string_lossy()),
            Arc::new(source),
        ))
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.source.len()
    }
}

/// Identifiers of an open upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub file_id: String,
    pub session_id: String,
}

impl From<CreateUploadResponse> for SessionInfo {
    fn from(resp: CreateUploadResponse) -> Self {
        Self {
            file_id: resp.file_id,
            session_id: resp.upload_id,
        }
    }
}

/// Notification emitted by the pipeline. Delivery is best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// Every chunk of the file was accepted.
    FileCompleted {
        tracking_key: String,
        file_id: String,
        file_name: String,
    },
    /// Session creation or a chunk upload failed; the file was abandoned.
    FileFailed {
        tracking_key: String,
        file_name: String,
        error: String,
    },
    /// The file was cancelled before it finished.
    FileCancelled { tracking_key: String },
    /// The contents of `destination` changed and listings should refresh.
    ListingChanged { destination: String },
}

//! Upload pipeline configuration.

use std::time::Duration;

use ledger_protocol::{CHUNK_SIZE, COMPLETED_HOLD, MAX_CONCURRENT_UPLOADS};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Tunables of the upload pipeline. Every field has a default, so a
/// partial (or empty) TOML table is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Bytes per chunk (the last chunk of a file may be shorter).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Number of concurrent chunk uploads.
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,

    /// How long a finished file stays in the progress feed, in ms.
    #[serde(default = "default_completed_hold_ms")]
    pub completed_hold_ms: u64,

    /// Per-chunk upload timeout in seconds. Unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_timeout_secs: Option<u64>,

    /// Extra attempts for a failed chunk before the file is abandoned.
    #[serde(default)]
    pub chunk_retries: u32,

    /// Capacity of the event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_chunk_size() -> u64 {
    CHUNK_SIZE
}

fn default_max_concurrent_uploads() -> usize {
    MAX_CONCURRENT_UPLOADS
}

fn default_completed_hold_ms() -> u64 {
    COMPLETED_HOLD.as_millis() as u64
}

fn default_event_buffer() -> usize {
    256
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
            completed_hold_ms: default_completed_hold_ms(),
            chunk_timeout_secs: None,
            chunk_retries: 0,
            event_buffer: default_event_buffer(),
        }
    }
}

impl UploadConfig {
    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::Config("chunk_size must be greater than zero".into()));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(UploadError::Config(
                "max_concurrent_uploads must be at least 1".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(UploadError::Config("event_buffer must be at least 1".into()));
        }
        Ok(())
    }

    pub fn completed_hold(&self) -> Duration {
        Duration::from_millis(self.completed_hold_ms)
    }

    pub fn chunk_timeout(&self) -> Option<Duration> {
        self.chunk_timeout_secs.map(Duration::from_secs)
    }
}

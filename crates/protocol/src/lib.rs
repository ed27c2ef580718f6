pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{CHUNK_SIZE, COMPLETED_HOLD, DEFAULT_CONTENT_TYPE, MAX_CONCURRENT_UPLOADS};
pub use messages::{ChunkUploadRequest, CreateUploadRequest, CreateUploadResponse};
pub use types::UploadStatus;

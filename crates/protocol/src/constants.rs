use std::time::Duration;

/// Size of every chunk except possibly the last one of a file (5 MiB).
pub const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Number of chunk uploads allowed in flight at once.
pub const MAX_CONCURRENT_UPLOADS: usize = 3;

/// How long a finished file stays visible at 100% before it is dropped
/// from the progress feed.
pub const COMPLETED_HOLD: Duration = Duration::from_millis(2000);

/// Content type sent when the file type cannot be detected.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Route used to begin an upload session.
pub const CREATE_UPLOAD_ROUTE: &str = "/upload/create";

/// Route prefix for chunk uploads; the file id is appended.
pub const CHUNK_UPLOAD_ROUTE: &str = "/upload";

/// Multipart part name carrying the chunk bytes.
pub const CHUNK_PART_NAME: &str = "chunk";

//! Storage API seam.
//!
//! `UploadSessionClient` is implemented by [`HttpSessionClient`](crate::HttpSessionClient)
//! for the real server.

use std::future::Future;
use std::pin::Pin;

use ledger_protocol::{ChunkUploadRequest, CreateUploadRequest};

use crate::error::UploadError;
use crate::types::SessionInfo;

/// Future returned by [`UploadSessionClient`] methods.
pub type ClientFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// The two remote operations an upload needs.
pub trait UploadSessionClient: Send + Sync {
    /// Creates the server-side file and upload session.
    fn begin_session<'a>(
        &'a self,
        request: &'a CreateUploadRequest,
    ) -> ClientFuture<'a, SessionInfo>;

    /// Uploads one chunk. `Ok(false)` means the server refused it.
    fn upload_chunk<'a>(
        &'a self,
        request: &'a ChunkUploadRequest,
        data: &'a [u8],
    ) -> ClientFuture<'a, bool>;
}

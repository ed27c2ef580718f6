//! Per-chunk integrity digests.

use std::future::Future;
use std::pin::Pin;

use ledger_transfer::{ChecksumError, checksum_bytes};

/// Future returned by [`ChecksumProvider::digest`].
pub type ChecksumFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, ChecksumError>> + Send + 'a>>;

/// Computes the lowercase hex digest sent alongside every chunk.
pub trait ChecksumProvider: Send + Sync {
    fn digest<'a>(&'a self, data: &'a [u8]) -> ChecksumFuture<'a>;
}

/// SHA-256, the digest the storage server verifies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Checksum;

impl ChecksumProvider for Sha256Checksum {
    fn digest<'a>(&'a self, data: &'a [u8]) -> ChecksumFuture<'a> {
        Box::pin(async move { Ok(checksum_bytes(data)) })
    }
}

//! State shared by intake and the worker pool.

use std::sync::Arc;

use ledger_transfer::{ProgressTracker, TaskQueue};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::checksum::ChecksumProvider;
use crate::client::UploadSessionClient;
use crate::config::UploadConfig;
use crate::types::UploadEvent;

/// Everything a pipeline stage needs, behind one `Arc`.
pub(crate) struct UploadContext {
    pub(crate) config: UploadConfig,
    pub(crate) client: Arc<dyn UploadSessionClient>,
    pub(crate) checksum: Arc<dyn ChecksumProvider>,
    pub(crate) queue: TaskQueue,
    pub(crate) tracker: ProgressTracker,
    pub(crate) events_tx: mpsc::Sender<UploadEvent>,
    pub(crate) shutdown: CancellationToken,
}

impl UploadContext {
    /// Publishes an event without waiting. Events are dropped when nobody
    /// drains the channel fast enough.
    pub(crate) fn emit(&self, event: UploadEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!(?event, "event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                trace!("event receiver dropped");
            }
        }
    }
}

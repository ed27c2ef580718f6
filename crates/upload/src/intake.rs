//! File intake: register, open a session, enqueue chunks.
//!
//! Registration is synchronous so every file is visible in the progress
//! feed as soon as `intake` returns. Session creation runs on one spawned
//! task per file, so a slow session for one file never holds up another.

use std::sync::Arc;

use ledger_protocol::{CreateUploadRequest, UploadStatus};
use ledger_transfer::{
    FileMeta, TransferError, UploadTask, chunk_count, split, validate_destination_path,
    validate_file_name,
};
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::context::UploadContext;
use crate::error::UploadError;
use crate::pool::WorkerPool;
use crate::types::{UploadEvent, UploadFile};

/// Accepts batches of files and feeds their chunks to the worker pool.
#[derive(Clone)]
pub struct IntakeController {
    ctx: Arc<UploadContext>,
    pool: WorkerPool,
    in_flight: Arc<watch::Sender<usize>>,
}

/// Decrements the in-flight pipeline count when dropped.
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl InFlightGuard {
    fn acquire(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl IntakeController {
    pub(crate) fn new(ctx: Arc<UploadContext>, pool: WorkerPool) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            ctx,
            pool,
            in_flight: Arc::new(in_flight),
        }
    }

    /// Registers `files` for upload into `destination` and returns their
    /// tracking keys, in input order.
    ///
    /// Each file gets a `Pending` entry before this returns; sessions are
    /// opened in the background. Files that cannot be split are marked
    /// `Error` immediately. An empty batch does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn intake(
        &self,
        destination: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<String>, UploadError> {
        if files.is_empty() {
            debug!("intake called with no files");
            return Ok(Vec::new());
        }
        let destination = validate_destination_path(destination)?;
        info!(files = files.len(), destination = %destination, "intake");

        let mut keys = Vec::with_capacity(files.len());
        for file in files {
            let key = Uuid::new_v4().to_string();
            let size = file.size();
            let chunks = chunk_count(size, self.ctx.config.chunk_size);

            self.ctx.tracker.create(
                &key,
                FileMeta {
                    file_name: file.name.clone(),
                    total_chunks: chunks.as_ref().copied().unwrap_or(0),
                    total_bytes: size,
                },
            )?;

            match chunks {
                Ok(_) => self.spawn_pipeline(key.clone(), destination.clone(), file),
                Err(e) => self.abandon(&key, &file.name, &e.into()),
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Number of files whose session is still being opened.
    pub fn pending_sessions(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Waits until every spawned pipeline has enqueued or given up.
    pub async fn wait_settled(&self) {
        let mut rx = self.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn spawn_pipeline(&self, key: String, destination: String, file: UploadFile) {
        let guard = InFlightGuard::acquire(&self.in_flight);
        let intake = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let result = tokio::select! {
                result = intake.open_and_enqueue(&key, &destination, &file) => result,
                _ = intake.ctx.shutdown.cancelled() => Err(UploadError::Cancelled),
            };
            match result {
                Ok(0) => {}
                Ok(queued) => {
                    debug!(key = %key, queued, "chunks queued");
                    intake.pool.ensure_running();
                }
                Err(UploadError::Cancelled) => {
                    if intake.ctx.tracker.cancel(&key) {
                        intake.ctx.emit(UploadEvent::FileCancelled {
                            tracking_key: key.clone(),
                        });
                    }
                }
                Err(e) => intake.abandon(&key, &file.name, &e),
            }
        });
    }

    /// Opens the session and queues one task per chunk. Returns the number
    /// of queued tasks; 0 if the file was settled in the meantime.
    async fn open_and_enqueue(
        &self,
        key: &str,
        destination: &str,
        file: &UploadFile,
    ) -> Result<usize, UploadError> {
        validate_file_name(&file.name)?;

        let request = CreateUploadRequest {
            file_name: file.name.clone(),
            content_type: file.content_type.clone(),
            path: destination.to_string(),
        };
        let session = self.ctx.client.begin_session(&request).await?;
        debug!(key = %key, file_id = %session.file_id, "upload session opened");

        if let Err(e) = self.ctx.tracker.resolve_tracking_key_to_file_id(
            key,
            &session.file_id,
            &session.session_id,
        ) {
            return match e {
                TransferError::InvalidTransition { from, .. } if from.is_terminal() => {
                    debug!(key = %key, status = from.label(), "file settled before session opened");
                    Ok(0)
                }
                TransferError::UnknownKey(_) => {
                    debug!(key = %key, "file dismissed before session opened");
                    Ok(0)
                }
                other => Err(other.into()),
            };
        }

        let ranges = split(file.size(), self.ctx.config.chunk_size)?;
        let total_chunks = ranges.total();
        let tasks: Vec<UploadTask> = ranges
            .map(|chunk| UploadTask {
                tracking_key: key.to_string(),
                file_id: session.file_id.clone(),
                session_id: session.session_id.clone(),
                file_name: file.name.clone(),
                destination: destination.to_string(),
                chunk,
                total_chunks,
                source: Arc::clone(&file.source),
            })
            .collect();
        let queued = tasks.len();

        // A cancel between resolve and here discards nothing, so check again
        // after pushing.
        self.ctx.queue.extend(tasks);
        if self.ctx.tracker.status(key) != Some(UploadStatus::Active) {
            self.ctx.queue.discard_file(key);
            return Ok(0);
        }
        Ok(queued)
    }

    /// Marks the file `Error` and tells listeners.
    fn abandon(&self, key: &str, file_name: &str, err: &UploadError) {
        let message = err.to_string();
        if self.ctx.tracker.fail(key, &message) {
            error!(key = %key, file = %file_name, error = %message, "could not start upload");
            self.ctx.emit(UploadEvent::FileFailed {
                tracking_key: key.to_string(),
                file_name: file_name.to_string(),
                error: message,
            });
        }
    }
}

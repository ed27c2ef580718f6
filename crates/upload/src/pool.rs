//! Bounded pool of workers draining the task queue.
//!
//! The pool is not a daemon: a launch runs `max_concurrent_uploads`
//! workers until every one of them finds the queue empty, then the pool
//! goes idle. Intake calls [`WorkerPool::ensure_running`] after every
//! enqueue, which starts a new launch only when none is active.

use std::sync::Arc;

use ledger_protocol::{ChunkUploadRequest, UploadStatus};
use ledger_transfer::{ChunkRecord, UploadTask};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::UploadContext;
use crate::error::UploadError;
use crate::types::UploadEvent;

/// Handle to the worker pool. Clones share the same running state.
#[derive(Clone)]
pub struct WorkerPool {
    ctx: Arc<UploadContext>,
    running: Arc<watch::Sender<bool>>,
}

impl WorkerPool {
    pub(crate) fn new(ctx: Arc<UploadContext>) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            ctx,
            running: Arc::new(running),
        }
    }

    /// Returns `true` while a launch is draining the queue.
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Number of workers started per launch.
    pub fn concurrency(&self) -> usize {
        self.ctx.config.max_concurrent_uploads
    }

    /// Starts a background launch unless one is already active.
    ///
    /// Returns `true` if this call started the pool. Must be called from
    /// within a tokio runtime.
    pub fn ensure_running(&self) -> bool {
        if !self.claim() {
            return false;
        }
        let pool = self.clone();
        tokio::spawn(async move {
            pool.drain().await;
        });
        true
    }

    /// Runs the pool in the current task until the queue is drained.
    ///
    /// Returns the number of tasks processed. If another launch is already
    /// active this only waits for it to finish and returns 0.
    pub async fn launch(&self) -> usize {
        if !self.claim() {
            self.wait_idle().await;
            return 0;
        }
        self.drain().await
    }

    /// Waits until no launch is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// Atomically flips the running flag from idle to running.
    fn claim(&self) -> bool {
        self.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        })
    }

    /// Runs worker rounds until the queue is empty at release time.
    ///
    /// The flag is only released while the queue is observed empty under
    /// the same lock intake contends on, so a task enqueued as the last
    /// worker exits either starts another round here or a fresh launch.
    async fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            processed += self.run_round().await;

            let released = self.running.send_if_modified(|running| {
                if self.ctx.queue.is_empty() || self.ctx.shutdown.is_cancelled() {
                    *running = false;
                    true
                } else {
                    false
                }
            });
            if released {
                debug!(processed, "worker pool drained");
                return processed;
            }
        }
    }

    /// Starts exactly `concurrency` workers and waits for all of them.
    async fn run_round(&self) -> usize {
        let concurrency = self.concurrency();
        debug!(workers = concurrency, queued = self.ctx.queue.len(), "launching workers");

        let mut workers = JoinSet::new();
        for id in 0..concurrency {
            workers.spawn(run_worker(Arc::clone(&self.ctx), id));
        }

        let mut processed = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(count) => processed += count,
                Err(e) => error!(error = %e, "upload worker panicked"),
            }
        }
        processed
    }
}

/// One worker: pop, upload, record, repeat until the queue is empty.
async fn run_worker(ctx: Arc<UploadContext>, id: usize) -> usize {
    let mut processed = 0;
    loop {
        if ctx.shutdown.is_cancelled() {
            break;
        }
        let Some(task) = ctx.queue.pop_front() else {
            break;
        };

        // The file may have failed or been cancelled after this task was
        // queued.
        if ctx.tracker.status(&task.tracking_key) != Some(UploadStatus::Active) {
            debug!(worker = id, key = %task.tracking_key, "skipping chunk of settled file");
            continue;
        }

        let result = tokio::select! {
            result = upload_task(&ctx, &task) => result,
            _ = ctx.shutdown.cancelled() => Err(UploadError::Cancelled),
        };
        settle_task(&ctx, &task, result);
        processed += 1;
    }
    debug!(worker = id, processed, "worker found queue empty");
    processed
}

/// Reads, checksums and uploads one chunk, retrying as configured.
async fn upload_task(ctx: &UploadContext, task: &UploadTask) -> Result<(), UploadError> {
    let data = task.read_bytes().await?;
    let checksum = ctx.checksum.digest(&data).await?;
    let request = ChunkUploadRequest {
        upload_id: task.session_id.clone(),
        path: task.destination.clone(),
        file_id: task.file_id.clone(),
        checksum,
        chunk_number: task.chunk_number(),
        total_chunks: task.total_chunks,
    };

    let mut attempt = 0;
    loop {
        match send_chunk(ctx, &request, &data).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < ctx.config.chunk_retries => {
                attempt += 1;
                warn!(
                    key = %task.tracking_key,
                    chunk = request.chunk_number,
                    attempt,
                    error = %e,
                    "chunk upload failed, retrying"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

async fn send_chunk(
    ctx: &UploadContext,
    request: &ChunkUploadRequest,
    data: &[u8],
) -> Result<(), UploadError> {
    let upload = ctx.client.upload_chunk(request, data);
    let accepted = match ctx.config.chunk_timeout() {
        Some(limit) => tokio::time::timeout(limit, upload)
            .await
            .map_err(|_| UploadError::Timeout(limit))??,
        None => upload.await?,
    };

    if accepted {
        Ok(())
    } else {
        Err(UploadError::Chunk(format!(
            "server rejected chunk {} of {}",
            request.chunk_number, request.total_chunks
        )))
    }
}

/// Feeds the outcome of one task back into the tracker and event feed.
fn settle_task(ctx: &UploadContext, task: &UploadTask, result: Result<(), UploadError>) {
    let key = &task.tracking_key;
    match result {
        Ok(()) => match ctx.tracker.record_chunk(key, task.chunk.length) {
            ChunkRecord::Progress {
                chunks_completed,
                total_chunks,
            } => {
                debug!(key = %key, chunks_completed, total_chunks, "chunk uploaded");
            }
            ChunkRecord::Completed { file_id, file_name } => {
                info!(key = %key, file = %file_name, file_id = %file_id, "file uploaded");
                ctx.tracker.schedule_removal(key, ctx.config.completed_hold());
                ctx.emit(UploadEvent::FileCompleted {
                    tracking_key: key.clone(),
                    file_id,
                    file_name,
                });
                ctx.emit(UploadEvent::ListingChanged {
                    destination: task.destination.clone(),
                });
            }
            ChunkRecord::Ignored => {
                debug!(key = %key, chunk = task.chunk_number(), "chunk finished for settled file");
            }
        },
        Err(UploadError::Cancelled) => {
            if ctx.tracker.cancel(key) {
                let discarded = ctx.queue.discard_file(key);
                debug!(key = %key, discarded, "upload cancelled");
                ctx.emit(UploadEvent::FileCancelled {
                    tracking_key: key.clone(),
                });
            }
        }
        Err(e) => {
            let message = e.to_string();
            if ctx.tracker.fail(key, &message) {
                let discarded = ctx.queue.discard_file(key);
                error!(
                    key = %key,
                    file = %task.file_name,
                    chunk = task.chunk_number(),
                    discarded,
                    error = %message,
                    "file upload failed"
                );
                ctx.emit(UploadEvent::FileFailed {
                    tracking_key: key.clone(),
                    file_name: task.file_name.clone(),
                    error: message,
                });
            }
        }
    }
}

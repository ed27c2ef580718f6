//! Upload orchestrator: the entry point wiring intake, queue, pool and
//! progress tracker together.

use std::sync::Arc;

use ledger_transfer::{ProgressSnapshot, ProgressTracker, TaskQueue};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::checksum::{ChecksumProvider, Sha256Checksum};
use crate::client::UploadSessionClient;
use crate::config::UploadConfig;
use crate::context::UploadContext;
use crate::error::UploadError;
use crate::intake::IntakeController;
use crate::pool::WorkerPool;
use crate::types::{UploadEvent, UploadFile};

/// Owns one upload pipeline.
pub struct UploadOrchestrator {
    ctx: Arc<UploadContext>,
    intake: IntakeController,
    pool: WorkerPool,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl UploadOrchestrator {
    /// Creates an orchestrator using SHA-256 chunk checksums.
    pub fn new(
        config: UploadConfig,
        client: Arc<dyn UploadSessionClient>,
    ) -> Result<Self, UploadError> {
        Self::with_checksum(config, client, Arc::new(Sha256Checksum))
    }

    /// Creates an orchestrator with a custom checksum provider.
    pub fn with_checksum(
        config: UploadConfig,
        client: Arc<dyn UploadSessionClient>,
        checksum: Arc<dyn ChecksumProvider>,
    ) -> Result<Self, UploadError> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
        let ctx = Arc::new(UploadContext {
            config,
            client,
            checksum,
            queue: TaskQueue::new(),
            tracker: ProgressTracker::new(),
            events_tx,
            shutdown: CancellationToken::new(),
        });
        let pool = WorkerPool::new(Arc::clone(&ctx));
        let intake = IntakeController::new(Arc::clone(&ctx), pool.clone());
        Ok(Self {
            ctx,
            intake,
            pool,
            events_rx: Some(events_rx),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.ctx.config
    }

    /// Registers files for upload into `destination`.
    ///
    /// See [`IntakeController::intake`].
    pub fn intake(
        &self,
        destination: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<String>, UploadError> {
        if self.ctx.shutdown.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        self.intake.intake(destination, files)
    }

    /// Cancels a pending or active file.
    ///
    /// Queued chunks are discarded. A chunk already being uploaded runs to
    /// completion but no longer counts. Returns `false` if the file is
    /// unknown or already settled.
    pub fn cancel(&self, tracking_key: &str) -> bool {
        if !self.ctx.tracker.cancel(tracking_key) {
            return false;
        }
        let discarded = self.ctx.queue.discard_file(tracking_key);
        info!(key = %tracking_key, discarded, "upload cancelled");
        self.ctx.emit(UploadEvent::FileCancelled {
            tracking_key: tracking_key.to_string(),
        });
        true
    }

    /// Removes a failed or cancelled entry from the progress feed.
    pub fn dismiss(&self, tracking_key: &str) -> bool {
        self.ctx.tracker.dismiss(tracking_key)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.ctx.tracker.snapshot()
    }

    /// Subscribes to progress snapshots, published on every change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.ctx.tracker.subscribe()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.ctx.tracker
    }

    /// Returns `true` while sessions are being opened or chunks uploaded.
    pub fn is_uploading(&self) -> bool {
        self.intake.pending_sessions() > 0 || self.pool.is_running()
    }

    /// Waits until every intaken file has finished, failed or been
    /// cancelled.
    pub async fn wait_idle(&self) {
        loop {
            self.intake.wait_settled().await;
            self.pool.wait_idle().await;
            if !self.is_uploading() {
                return;
            }
        }
    }

    /// Stops the pipeline. In-flight chunks are abandoned and every
    /// unfinished file is marked cancelled.
    pub async fn shutdown(&self) {
        debug!("shutting down upload pipeline");
        self.ctx.shutdown.cancel();
        self.wait_idle().await;

        let unfinished: Vec<String> = self
            .ctx
            .tracker
            .snapshot()
            .files
            .into_iter()
            .filter(|f| f.status.is_active())
            .map(|f| f.tracking_key)
            .collect();
        for key in unfinished {
            self.cancel(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MIB, MockClient, drain_events};
    use ledger_protocol::UploadStatus;
    use std::time::Duration;

    fn orchestrator_with(client: &Arc<MockClient>, config: UploadConfig) -> UploadOrchestrator {
        let client: Arc<dyn UploadSessionClient> = Arc::clone(client) as _;
        UploadOrchestrator::new(config, client).unwrap()
    }

    fn orchestrator(client: &Arc<MockClient>) -> UploadOrchestrator {
        orchestrator_with(client, UploadConfig::default())
    }

    fn file(name: &str, size: u64) -> UploadFile {
        UploadFile::from_bytes(name, "application/octet-stream", vec![0u8; size as usize])
    }

    #[test]
    fn invalid_config_rejected() {
        let client: Arc<dyn UploadSessionClient> = Arc::new(MockClient::new());
        let config = UploadConfig {
            max_concurrent_uploads: 0,
            ..UploadConfig::default()
        };
        assert!(matches!(
            UploadOrchestrator::new(config, client),
            Err(UploadError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn twelve_mib_file_uploads_in_three_chunks() {
        let client = Arc::new(MockClient::new());
        let mut orch = orchestrator(&client);
        let mut events = orch.take_events().unwrap();
        assert!(orch.take_events().is_none());

        let keys = orch
            .intake("videos", vec![file("movie.mp4", 12 * MIB)])
            .unwrap();
        orch.wait_idle().await;

        let sizes: Vec<usize> = {
            let mut chunks = client.chunks.lock().unwrap().clone();
            chunks.sort_by_key(|(req, _)| req.chunk_number);
            chunks.iter().map(|(_, len)| *len).collect()
        };
        assert_eq!(
            sizes,
            vec![5 * MIB as usize, 5 * MIB as usize, 2 * MIB as usize],
        );

        let entry = orch.tracker().get(&keys[0]).unwrap();
        assert_eq!(entry.chunks_completed, 3);
        assert_eq!(entry.percent(), 100);
        assert_eq!(entry.status, UploadStatus::Completing);

        tokio::time::sleep(Duration::from_millis(2001)).await;
        assert!(orch.tracker().get(&keys[0]).is_none());
        assert!(orch.tracker().is_empty());

        let events = drain_events(&mut events);
        assert!(events.contains(&UploadEvent::ListingChanged {
            destination: "videos".into(),
        }));
    }

    #[tokio::test]
    async fn two_files_reach_target_bytes() {
        let client = Arc::new(MockClient::new());
        let orch = orchestrator(&client);

        let keys = orch
            .intake("", vec![file("small.bin", MIB), file("large.bin", 6 * MIB)])
            .unwrap();
        orch.wait_idle().await;

        assert_eq!(client.chunk_count(), 3);
        let snapshot = orch.snapshot();
        assert_eq!(snapshot.aggregate.target_bytes, 7 * MIB);
        assert_eq!(snapshot.aggregate.uploaded_bytes, 7 * MIB);
        assert_eq!(snapshot.aggregate.percent(), 100);
        for key in &keys {
            assert_eq!(orch.tracker().status(key), Some(UploadStatus::Completing));
        }
    }

    #[tokio::test]
    async fn session_failure_isolated_to_one_file() {
        let client = Arc::new(MockClient::new().fail_session("x.bin"));
        let orch = orchestrator(&client);

        let keys = orch
            .intake("", vec![file("x.bin", 2 * MIB), file("y.bin", 2 * MIB)])
            .unwrap();
        orch.wait_idle().await;

        assert_eq!(orch.tracker().status(&keys[0]), Some(UploadStatus::Error));
        assert_eq!(
            orch.tracker().status(&keys[1]),
            Some(UploadStatus::Completing),
        );
        assert!(client.chunks_for("x.bin").is_empty());
        assert_eq!(client.chunks_for("y.bin"), vec![1]);
    }

    #[tokio::test]
    async fn chunk_failure_stops_only_that_file() {
        let client = Arc::new(MockClient::new().reject_chunk("z.bin", 2));
        let config = UploadConfig {
            max_concurrent_uploads: 1,
            ..UploadConfig::default()
        };
        let orch = orchestrator_with(&client, config);

        let keys = orch
            .intake("", vec![file("z.bin", 15 * MIB), file("w.bin", MIB)])
            .unwrap();
        orch.wait_idle().await;

        let failed = orch.tracker().get(&keys[0]).unwrap();
        assert_eq!(failed.status, UploadStatus::Error);
        assert_eq!(failed.chunks_completed, 1);
        assert!(!client.chunks_for("z.bin").contains(&3));
        assert_eq!(
            orch.tracker().status(&keys[1]),
            Some(UploadStatus::Completing),
        );

        // The failed file's unsent bytes no longer count toward the target.
        let aggregate = orch.snapshot().aggregate;
        assert_eq!(aggregate.target_bytes, 6 * MIB);
        assert_eq!(aggregate.uploaded_bytes, 6 * MIB);

        assert!(orch.dismiss(&keys[0]));
        assert!(orch.tracker().get(&keys[0]).is_none());
    }

    #[tokio::test]
    async fn empty_intake_is_noop() {
        let client = Arc::new(MockClient::new());
        let orch = orchestrator(&client);

        let keys = orch.intake("docs", Vec::new()).unwrap();

        assert!(keys.is_empty());
        assert!(!orch.is_uploading());
        assert!(orch.tracker().is_empty());
        orch.wait_idle().await;
        assert_eq!(client.session_count(), 0);
    }

    #[tokio::test]
    async fn zero_byte_file_sends_one_empty_chunk() {
        let client = Arc::new(MockClient::new());
        let orch = orchestrator(&client);

        let keys = orch.intake("", vec![file("empty.txt", 0)]).unwrap();
        orch.wait_idle().await;

        let chunks = client.chunks.lock().unwrap().clone();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0.total_chunks, 1);
        assert_eq!(chunks[0].1, 0);
        assert_eq!(
            orch.tracker().status(&keys[0]),
            Some(UploadStatus::Completing),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_queued_chunks() {
        let client = Arc::new(MockClient::new().with_chunk_delay(Duration::from_secs(1)));
        let config = UploadConfig {
            max_concurrent_uploads: 1,
            ..UploadConfig::default()
        };
        let mut orch = orchestrator_with(&client, config);
        let mut events = orch.take_events().unwrap();

        let keys = orch.intake("", vec![file("long.bin", 20 * MIB)]).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(orch.cancel(&keys[0]));
        assert!(!orch.cancel(&keys[0]));
        orch.wait_idle().await;

        let entry = orch.tracker().get(&keys[0]).unwrap();
        assert_eq!(entry.status, UploadStatus::Cancelled);
        assert!(client.chunk_count() < 4);
        assert!(drain_events(&mut events).contains(&UploadEvent::FileCancelled {
            tracking_key: keys[0].clone(),
        }));
        assert!(orch.dismiss(&keys[0]));
    }

    #[tokio::test]
    async fn failed_file_can_be_intaken_again() {
        let client = Arc::new(MockClient::new().reject_chunk_times("retry.bin", 1, 1));
        let orch = orchestrator(&client);

        let first = orch.intake("", vec![file("retry.bin", 10)]).unwrap();
        orch.wait_idle().await;
        assert_eq!(orch.tracker().status(&first[0]), Some(UploadStatus::Error));

        let second = orch.intake("", vec![file("retry.bin", 10)]).unwrap();
        orch.wait_idle().await;
        assert_ne!(first[0], second[0]);
        assert_eq!(
            orch.tracker().status(&second[0]),
            Some(UploadStatus::Completing),
        );
    }

    #[tokio::test]
    async fn intake_after_shutdown_rejected() {
        let client = Arc::new(MockClient::new());
        let orch = orchestrator(&client);

        orch.shutdown().await;

        assert!(matches!(
            orch.intake("", vec![file("late.bin", 1)]),
            Err(UploadError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_unfinished_files() {
        let client = Arc::new(MockClient::new().with_session_delay(Duration::from_secs(10)));
        let orch = orchestrator(&client);

        let keys = orch
            .intake("", vec![file("a.bin", 10), file("b.bin", 10)])
            .unwrap();
        orch.shutdown().await;

        for key in &keys {
            assert_eq!(orch.tracker().status(key), Some(UploadStatus::Cancelled));
        }
        assert!(!orch.is_uploading());
        assert_eq!(client.chunk_count(), 0);
    }

    #[tokio::test]
    async fn progress_feed_publishes_changes() {
        let client = Arc::new(MockClient::new());
        let orch = orchestrator(&client);
        let mut feed = orch.subscribe();

        let keys = orch.intake("", vec![file("watch.bin", MIB)]).unwrap();
        feed.changed().await.unwrap();
        assert!(feed.borrow_and_update().get(&keys[0]).is_some());

        orch.wait_idle().await;
        let snapshot = feed.borrow().clone();
        assert_eq!(snapshot.get(&keys[0]).unwrap().percent(), 100);
    }
}

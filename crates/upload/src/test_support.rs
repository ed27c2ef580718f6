//! Mock storage client shared by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ledger_protocol::{ChunkUploadRequest, CreateUploadRequest};
use ledger_transfer::{ProgressTracker, TaskQueue};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::checksum::{ChecksumProvider, Sha256Checksum};
use crate::client::{ClientFuture, UploadSessionClient};
use crate::config::UploadConfig;
use crate::context::UploadContext;
use crate::error::UploadError;
use crate::types::{SessionInfo, UploadEvent};

pub(crate) const MIB: u64 = 1024 * 1024;

/// Builds a context around `client` with the given config.
pub(crate) fn context(
    config: UploadConfig,
    client: Arc<MockClient>,
) -> (Arc<UploadContext>, mpsc::Receiver<UploadEvent>) {
    context_with_checksum(config, client, Arc::new(Sha256Checksum))
}

/// Like [`context`], with a custom checksum provider.
pub(crate) fn context_with_checksum(
    config: UploadConfig,
    client: Arc<MockClient>,
    checksum: Arc<dyn ChecksumProvider>,
) -> (Arc<UploadContext>, mpsc::Receiver<UploadEvent>) {
    let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
    let ctx = UploadContext {
        config,
        client,
        checksum,
        queue: TaskQueue::new(),
        tracker: ProgressTracker::new(),
        events_tx,
        shutdown: CancellationToken::new(),
    };
    (Arc::new(ctx), events_rx)
}

/// Drains every event currently buffered.
pub(crate) fn drain_events(rx: &mut mpsc::Receiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Records every call and answers according to its scripted failures.
///
/// File ids are `id-{file_name}`, session ids `session-{file_name}`.
#[derive(Default)]
pub(crate) struct MockClient {
    pub(crate) sessions: Mutex<Vec<CreateUploadRequest>>,
    pub(crate) chunks: Mutex<Vec<(ChunkUploadRequest, usize)>>,
    failing_sessions: Mutex<HashSet<String>>,
    /// (file_id, chunk_number) -> remaining rejections; `u32::MAX` is permanent.
    rejections: Mutex<HashMap<(String, u32), u32>>,
    chunk_delay: Mutex<Option<Duration>>,
    session_delay: Mutex<Option<Duration>>,
    session_delays: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    pub(crate) peak_in_flight: AtomicUsize,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_session(self, file_name: &str) -> Self {
        self.failing_sessions
            .lock()
            .unwrap()
            .insert(file_name.to_string());
        self
    }

    pub(crate) fn reject_chunk(self, file_name: &str, chunk_number: u32) -> Self {
        self.reject_chunk_times(file_name, chunk_number, u32::MAX)
    }

    pub(crate) fn reject_chunk_times(self, file_name: &str, chunk_number: u32, times: u32) -> Self {
        self.rejections
            .lock()
            .unwrap()
            .insert((format!("id-{file_name}"), chunk_number), times);
        self
    }

    pub(crate) fn with_chunk_delay(self, delay: Duration) -> Self {
        *self.chunk_delay.lock().unwrap() = Some(delay);
        self
    }

    pub(crate) fn with_session_delay(self, delay: Duration) -> Self {
        *self.session_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Delays only the session for `file_name`, overriding the shared delay.
    pub(crate) fn with_session_delay_for(self, file_name: &str, delay: Duration) -> Self {
        self.session_delays
            .lock()
            .unwrap()
            .insert(file_name.to_string(), delay);
        self
    }

    pub(crate) fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    /// Chunk numbers uploaded for one file, in upload order.
    pub(crate) fn chunks_for(&self, file_name: &str) -> Vec<u32> {
        let file_id = format!("id-{file_name}");
        self.chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|(req, _)| req.file_id == file_id)
            .map(|(req, _)| req.chunk_number)
            .collect()
    }

    fn take_rejection(&self, file_id: &str, chunk_number: u32) -> bool {
        let mut rejections = self.rejections.lock().unwrap();
        match rejections.get_mut(&(file_id.to_string(), chunk_number)) {
            Some(0) | None => false,
            Some(remaining) => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
        }
    }
}

impl UploadSessionClient for MockClient {
    fn begin_session<'a>(
        &'a self,
        request: &'a CreateUploadRequest,
    ) -> ClientFuture<'a, SessionInfo> {
        self.sessions.lock().unwrap().push(request.clone());
        let delay = self
            .session_delays
            .lock()
            .unwrap()
            .get(&request.file_name)
            .copied()
            .or(*self.session_delay.lock().unwrap());
        let fails = self
            .failing_sessions
            .lock()
            .unwrap()
            .contains(&request.file_name);

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fails {
                return Err(UploadError::Session(format!(
                    "server refused {}",
                    request.file_name
                )));
            }
            Ok(SessionInfo {
                file_id: format!("id-{}", request.file_name),
                session_id: format!("session-{}", request.file_name),
            })
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        request: &'a ChunkUploadRequest,
        data: &'a [u8],
    ) -> ClientFuture<'a, bool> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = *self.chunk_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.chunks
                .lock()
                .unwrap()
                .push((request.clone(), data.len()));
            Ok(!self.take_rejection(&request.file_id, request.chunk_number))
        })
    }
}

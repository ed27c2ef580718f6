use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ledger_protocol::UploadStatus;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::TransferError;
use crate::types::{FileMeta, FileProgress};

/// Outcome of recording one uploaded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRecord {
    /// The chunk was counted; more chunks remain.
    Progress {
        chunks_completed: u32,
        total_chunks: u32,
    },
    /// The chunk was the file's last one; the entry is now `Completing`.
    Completed { file_id: String, file_name: String },
    /// The entry is gone or no longer accepting chunks (failed, cancelled).
    Ignored,
}

/// Batch-wide byte counters derived from the tracked files.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateProgress {
    pub target_bytes: u64,
    pub uploaded_bytes: u64,
    pub files: usize,
    pub bytes_per_second: f64,
}

impl AggregateProgress {
    /// Uploaded share of the batch as a whole percentage, rounded down.
    pub fn percent(&self) -> u8 {
        if self.target_bytes == 0 {
            return 0;
        }
        (self.uploaded_bytes.min(self.target_bytes) * 100 / self.target_bytes) as u8
    }
}

/// Immutable view of every tracked file, in intake order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub files: Vec<FileProgress>,
    pub aggregate: AggregateProgress,
}

impl ProgressSnapshot {
    /// Looks up a file by tracking key.
    pub fn get(&self, tracking_key: &str) -> Option<&FileProgress> {
        self.files.iter().find(|f| f.tracking_key == tracking_key)
    }
}

/// Per-file upload progress shared by intake, workers and readers.
///
/// Cloning yields another handle to the same state. Each mutation runs
/// under one lock and publishes a fresh [`ProgressSnapshot`] to
/// subscribers.
#[derive(Clone)]
pub struct ProgressTracker {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<TrackerInner>,
    feed: watch::Sender<ProgressSnapshot>,
}

struct Tracked {
    seq: u64,
    progress: FileProgress,
}

#[derive(Default)]
struct TrackerInner {
    entries: HashMap<String, Tracked>,
    next_seq: u64,
    target_bytes: u64,
    uploaded_bytes: u64,
    speed: SpeedCalculator,
}

impl TrackerInner {
    fn snapshot(&self) -> ProgressSnapshot {
        let mut tracked: Vec<&Tracked> = self.entries.values().collect();
        tracked.sort_by_key(|t| t.seq);
        ProgressSnapshot {
            files: tracked.into_iter().map(|t| t.progress.clone()).collect(),
            aggregate: AggregateProgress {
                target_bytes: self.target_bytes,
                uploaded_bytes: self.uploaded_bytes,
                files: self.entries.len(),
                bytes_per_second: self.speed.bytes_per_second(),
            },
        }
    }

    fn entry_mut(&mut self, key: &str) -> Result<&mut FileProgress, TransferError> {
        self.entries
            .get_mut(key)
            .map(|t| &mut t.progress)
            .ok_or_else(|| TransferError::UnknownKey(key.to_string()))
    }

    /// Drops a file's never-uploaded bytes from the batch target so the
    /// aggregate can still reach 100%.
    fn forfeit_remaining(&mut self, remaining: u64) {
        self.target_bytes = self.target_bytes.saturating_sub(remaining);
    }

    fn remove(&mut self, key: &str) -> Option<FileProgress> {
        let removed = self.entries.remove(key).map(|t| t.progress);
        if self.entries.is_empty() {
            self.target_bytes = 0;
            self.uploaded_bytes = 0;
            self.speed.reset();
        }
        removed
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (feed, _) = watch::channel(ProgressSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TrackerInner::default()),
                feed,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerInner> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` under the lock and publishes the resulting state.
    fn mutate<R>(&self, f: impl FnOnce(&mut TrackerInner) -> R) -> R {
        let mut state = self.state();
        let result = f(&mut state);
        self.shared.feed.send_replace(state.snapshot());
        result
    }

    /// Registers a new `Pending` entry.
    pub fn create(&self, tracking_key: &str, meta: FileMeta) -> Result<(), TransferError> {
        self.mutate(|s| {
            if s.entries.contains_key(tracking_key) {
                return Err(TransferError::DuplicateKey(tracking_key.to_string()));
            }
            s.target_bytes += meta.total_bytes;
            let seq = s.next_seq;
            s.next_seq += 1;
            s.entries.insert(
                tracking_key.to_string(),
                Tracked {
                    seq,
                    progress: FileProgress::new(tracking_key, meta),
                },
            );
            Ok(())
        })
    }

    /// Binds the server identifiers to a `Pending` entry and makes it
    /// `Active`.
    ///
    /// Fails with [`TransferError::InvalidTransition`] if the entry left
    /// `Pending` in the meantime (for example it was cancelled while the
    /// session was being created).
    pub fn resolve_tracking_key_to_file_id(
        &self,
        tracking_key: &str,
        file_id: &str,
        session_id: &str,
    ) -> Result<(), TransferError> {
        self.mutate(|s| {
            let entry = s.entry_mut(tracking_key)?;
            if entry.status != UploadStatus::Pending {
                return Err(TransferError::InvalidTransition {
                    key: tracking_key.to_string(),
                    from: entry.status,
                    to: UploadStatus::Active,
                });
            }
            entry.status = UploadStatus::Active;
            entry.file_id = file_id.to_string();
            entry.session_id = session_id.to_string();
            Ok(())
        })
    }

    /// Counts one uploaded chunk of `bytes` bytes against the file.
    pub fn record_chunk(&self, tracking_key: &str, bytes: u64) -> ChunkRecord {
        self.mutate(|s| {
            let Some(tracked) = s.entries.get_mut(tracking_key) else {
                return ChunkRecord::Ignored;
            };
            let entry = &mut tracked.progress;
            if entry.status != UploadStatus::Active {
                return ChunkRecord::Ignored;
            }
            entry.chunks_completed = (entry.chunks_completed + 1).min(entry.total_chunks);
            entry.bytes_uploaded = (entry.bytes_uploaded + bytes).min(entry.total_bytes);

            let record = if entry.is_complete() {
                entry.status = UploadStatus::Completing;
                ChunkRecord::Completed {
                    file_id: entry.file_id.clone(),
                    file_name: entry.file_name.clone(),
                }
            } else {
                ChunkRecord::Progress {
                    chunks_completed: entry.chunks_completed,
                    total_chunks: entry.total_chunks,
                }
            };

            s.uploaded_bytes += bytes;
            s.speed.add_sample(bytes);
            record
        })
    }

    /// Marks a `Pending`/`Active` entry as `Error`.
    ///
    /// Returns `false` if the entry is unknown or already settled.
    pub fn fail(&self, tracking_key: &str, message: &str) -> bool {
        self.settle(tracking_key, UploadStatus::Error, message)
    }

    /// Marks a `Pending`/`Active` entry as `Cancelled`.
    pub fn cancel(&self, tracking_key: &str) -> bool {
        self.settle(tracking_key, UploadStatus::Cancelled, "")
    }

    fn settle(&self, tracking_key: &str, status: UploadStatus, message: &str) -> bool {
        self.mutate(|s| {
            let Ok(entry) = s.entry_mut(tracking_key) else {
                return false;
            };
            if !entry.status.is_active() {
                return false;
            }
            entry.status = status;
            entry.error = message.to_string();
            let remaining = entry.remaining_bytes();
            s.forfeit_remaining(remaining);
            true
        })
    }

    /// Applies an arbitrary mutation to one entry.
    ///
    /// Byte changes made by `f` are reflected in the aggregate counters.
    pub fn update(
        &self,
        tracking_key: &str,
        f: impl FnOnce(&mut FileProgress),
    ) -> Result<(), TransferError> {
        self.mutate(|s| {
            let entry = s.entry_mut(tracking_key)?;
            let (total_before, uploaded_before) = (entry.total_bytes, entry.bytes_uploaded);
            f(entry);
            let (total_after, uploaded_after) = (entry.total_bytes, entry.bytes_uploaded);
            s.target_bytes = (s.target_bytes + total_after).saturating_sub(total_before);
            s.uploaded_bytes = (s.uploaded_bytes + uploaded_after).saturating_sub(uploaded_before);
            Ok(())
        })
    }

    /// Removes an entry immediately, whatever its state.
    pub fn remove(&self, tracking_key: &str) -> Option<FileProgress> {
        self.mutate(|s| s.remove(tracking_key))
    }

    /// Removes a settled (`Error`/`Cancelled`) entry. Returns `false` for
    /// entries that are still in flight.
    pub fn dismiss(&self, tracking_key: &str) -> bool {
        self.mutate(|s| {
            let settled = s
                .entries
                .get(tracking_key)
                .is_some_and(|t| t.progress.status.is_terminal());
            if settled {
                s.remove(tracking_key);
            }
            settled
        })
    }

    /// Removes a `Completing` entry after `hold`, letting readers show it
    /// at 100% in the meantime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_removal(&self, tracking_key: &str, hold: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        let key = tracking_key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            let removed = tracker.mutate(|s| {
                let completing = s
                    .entries
                    .get(&key)
                    .is_some_and(|t| t.progress.status == UploadStatus::Completing);
                completing && s.remove(&key).is_some()
            });
            if removed {
                debug!(key = %key, "completed entry removed");
            }
        })
    }

    /// Returns a copy of one entry.
    pub fn get(&self, tracking_key: &str) -> Option<FileProgress> {
        self.state()
            .entries
            .get(tracking_key)
            .map(|t| t.progress.clone())
    }

    /// Returns the status of one entry.
    pub fn status(&self, tracking_key: &str) -> Option<UploadStatus> {
        self.state()
            .entries
            .get(tracking_key)
            .map(|t| t.progress.status)
    }

    /// Returns the server file id bound to `tracking_key`, once known.
    pub fn file_id(&self, tracking_key: &str) -> Option<String> {
        self.state()
            .entries
            .get(tracking_key)
            .map(|t| t.progress.file_id.clone())
            .filter(|id| !id.is_empty())
    }

    /// Reverse lookup of [`file_id`](Self::file_id).
    pub fn tracking_key_for_file_id(&self, file_id: &str) -> Option<String> {
        self.state()
            .entries
            .values()
            .find(|t| t.progress.file_id == file_id)
            .map(|t| t.progress.tracking_key.clone())
    }

    /// Returns the current state of every tracked file.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state().snapshot()
    }

    /// Subscribes to snapshots published after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.shared.feed.subscribe()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Upload throughput over a sliding window of chunk completions.
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 100)
    }
}

impl SpeedCalculator {
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            samples: Vec::new(),
            max_samples,
            window,
        }
    }

    /// Records `bytes` completed now.
    pub fn add_sample(&mut self, bytes: u64) {
        let now = Instant::now();
        self.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(self.window) {
            self.samples.retain(|sample| sample.timestamp >= cutoff);
        }
        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Average bytes/second inside the window; 0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if self.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = self.samples.iter().map(|s| s.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to upload `remaining_bytes` at the current speed.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

//! Shared FIFO of pending chunk uploads.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::UploadTask;

/// Unbounded, non-blocking FIFO shared by intake and the worker pool.
///
/// Every operation takes the internal lock once, so concurrent callers
/// never observe a half-applied push or pop.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<UploadTask>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, VecDeque<UploadTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one task.
    pub fn push(&self, task: UploadTask) {
        self.tasks().push_back(task);
    }

    /// Appends all tasks of a file in order, under a single lock.
    pub fn extend(&self, tasks: impl IntoIterator<Item = UploadTask>) {
        self.tasks().extend(tasks);
    }

    /// Removes and returns the head, or `None` when the queue is empty.
    pub fn pop_front(&self) -> Option<UploadTask> {
        self.tasks().pop_front()
    }

    /// Drops every queued task belonging to `tracking_key`.
    ///
    /// Returns the number of tasks removed. Tasks already popped by a
    /// worker are not affected.
    pub fn discard_file(&self, tracking_key: &str) -> usize {
        let mut tasks = self.tasks();
        let before = tasks.len();
        tasks.retain(|t| t.tracking_key != tracking_key);
        before - tasks.len()
    }

    /// Number of queued tasks for `tracking_key`.
    pub fn pending_for(&self, tracking_key: &str) -> usize {
        self.tasks()
            .iter()
            .filter(|t| t.tracking_key == tracking_key)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }
}

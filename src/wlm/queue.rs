//! Per-model bounded job queue.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::WlmError;
use crate::wlm::job::Job;

/// A bounded, FIFO queue of pending jobs for one model.
///
/// `offer` blocks (up to a deadline) when the queue is full; `poll_batch`
/// blocks (up to a deadline) when the queue is empty. Both use a pair of
/// [`Notify`] handles rather than a condvar so callers can race the wait
/// against cancellation.
pub struct JobQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Job>>,
    not_empty: Notify,
    not_full: Notify,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue `job`, waiting up to `timeout` for room if the queue is full.
    ///
    /// On failure, returns the job back alongside the error so the caller
    /// can retry the *same* job (e.g. after scaling up) rather than losing
    /// it. `model` is only used to label the error.
    pub async fn offer(&self, model: &str, job: Job, timeout: Duration) -> Result<(), (Job, WlmError)> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut guard = self.inner.lock();
                if guard.len() < self.capacity {
                    guard.push_back(job);
                    drop(guard);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err((job, WlmError::QueueFull { model: model.to_string() }));
            }
            let remaining = deadline - now;

            // Register interest before checking again, so a notify fired
            // between the check above and this await is not missed.
            let notified = self.not_full.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    /// Drain up to `max_batch_size` jobs, waiting up to `max_wait` for the
    /// first job to arrive if the queue starts out empty.
    ///
    /// Once at least one job is present, returns immediately with whatever
    /// is available (up to `max_batch_size`) rather than waiting to fill
    /// the batch — this bounds tail latency for low-traffic models.
    pub async fn poll_batch(&self, max_batch_size: usize, max_wait: Duration) -> Vec<Job> {
        let deadline = Instant::now() + max_wait;

        loop {
            {
                let mut guard = self.inner.lock();
                if !guard.is_empty() {
                    let n = max_batch_size.min(guard.len());
                    let batch: Vec<Job> = guard.drain(..n).collect();
                    drop(guard);
                    self.not_full.notify_waiters();
                    return batch;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Vec::new();
            }
            let remaining = deadline - now;

            let notified = self.not_empty.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }
}

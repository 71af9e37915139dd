//! Turns pending jobs on a queue into batches a worker can execute.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::wlm::job::Job;
use crate::wlm::queue::JobQueue;

/// Batches jobs off a [`JobQueue`] for a single worker to execute.
///
/// A transient worker's aggregator is marked `drain` once the pool decides
/// to scale it down: `next_batch` then stops waiting for new arrivals and
/// only returns what is already queued, so the worker finishes its current
/// work and exits instead of blocking indefinitely on an idle queue.
pub struct BatchAggregator {
    queue: Arc<JobQueue>,
    batch_size: usize,
    max_batch_delay: Duration,
    drain: Arc<AtomicBool>,
}

impl BatchAggregator {
    pub fn new(queue: Arc<JobQueue>, batch_size: usize, max_batch_delay: Duration) -> Self {
        Self {
            queue,
            batch_size,
            max_batch_delay,
            drain: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle that lets the owning pool signal this aggregator to drain.
    pub fn drain_flag(&self) -> Arc<AtomicBool> {
        self.drain.clone()
    }

    pub fn is_draining(&self) -> bool {
        self.drain.load(Ordering::Acquire)
    }

    /// Collect the next batch of jobs.
    ///
    /// Blocks up to `max_batch_delay` for the first job when not draining;
    /// while draining, returns immediately with whatever is already queued
    /// (possibly empty, which signals the worker to stop).
    pub async fn next_batch(&self) -> Vec<Job> {
        let wait = if self.is_draining() { Duration::ZERO } else { self.max_batch_delay };
        self.queue.poll_batch(self.batch_size, wait).await
    }
}

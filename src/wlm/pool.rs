//! All workers and the job queue for one model.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;

use crate::wlm::queue::JobQueue;
use crate::wlm::worker::{Worker, WorkerHandle, WorkerState};

/// The per-model bundle of queue plus workers.
///
/// Owns exactly one [`JobQueue`] and an ordered list of [`Worker`]s. The
/// worker list is replaced atomically on mutation (spawn, cleanup) rather
/// than locked for the duration of a scan, so `workers()` never blocks a
/// concurrent `submit`.
///
/// Also owns this model's slice of the worker-task budget: `permits` is
/// topped up to `maxWorkers` by [`WorkerPool::ensure_capacity`] whenever
/// the model's configured bound grows, so a later `modelChanged` raising
/// `maxWorkers` can't starve `spawn_worker` of a permit it will never see.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    workers: RwLock<Vec<Arc<Worker>>>,
    permits: Arc<Semaphore>,
    granted_capacity: Mutex<usize>,
}

impl WorkerPool {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: Arc::new(JobQueue::new(queue_capacity)),
            workers: RwLock::new(Vec::new()),
            permits: Arc::new(Semaphore::new(0)),
            granted_capacity: Mutex::new(0),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    /// Grow this pool's permit budget so it totals at least `max_workers`.
    ///
    /// Monotonic — permits already granted and held by a running worker
    /// can't be revoked, so a `maxWorkers` decrease is not reflected here;
    /// only growth ever adds permits.
    pub fn ensure_capacity(&self, max_workers: usize) {
        let mut granted = self.granted_capacity.lock();
        if max_workers > *granted {
            self.permits.add_permits(max_workers - *granted);
            *granted = max_workers;
        }
    }

    /// Append a newly spawned worker, in spawn order.
    pub fn push_worker(&self, worker: Arc<Worker>) {
        self.workers.write().push(worker);
    }

    /// A snapshot view of every worker currently tracked (terminal or not).
    pub fn workers(&self) -> Vec<WorkerHandle> {
        self.workers.read().iter().map(|w| w.handle()).collect()
    }

    /// Count of workers not in `{STOPPED, ERROR, SCALED_DOWN}`.
    pub fn running_worker_count(&self) -> usize {
        self.workers.read().iter().filter(|w| !w.state().is_terminal()).count()
    }

    /// Permanent workers in insertion order, not yet terminal.
    pub fn non_terminal_permanent(&self) -> Vec<Arc<Worker>> {
        self.workers
            .read()
            .iter()
            .filter(|w| w.is_permanent() && !w.state().is_terminal())
            .cloned()
            .collect()
    }

    /// Atomically drop every worker in a terminal state from the visible
    /// list. Never cancels a still-running worker; O(n) in worker count.
    pub fn cleanup(&self) {
        let mut guard = self.workers.write();
        guard.retain(|w| !w.state().is_terminal());
    }

    /// Signal every non-terminal worker to stop, permanent or transient.
    pub fn shutdown_all(&self) {
        for worker in self.workers.read().iter() {
            worker.shutdown(crate::wlm::worker::ShutdownReason::External);
        }
    }

    pub fn debug_snapshot(&self) -> PoolSnapshot {
        let workers = self.workers.read();
        let permanent = workers.iter().filter(|w| w.is_permanent() && !w.state().is_terminal()).count();
        let transient = workers.iter().filter(|w| !w.is_permanent() && !w.state().is_terminal()).count();
        PoolSnapshot {
            permanent,
            transient,
            queue_len: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            states: workers.iter().map(|w| w.state()).collect(),
        }
    }
}

/// A point-in-time summary of a pool, for debug logging.
#[derive(Debug)]
pub struct PoolSnapshot {
    pub permanent: usize,
    pub transient: usize,
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub states: Vec<WorkerState>,
}

//! The long-running executor bound to one model, one device, one aggregator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::wlm::aggregator::BatchAggregator;
use crate::wlm::job::Job;
use crate::wlm::runtime::ModelRuntime;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// A worker's position in its state machine.
///
/// `SCALED_DOWN`, `STOPPED` and `ERROR` are terminal: once entered, the
/// state never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Waiting,
    Running,
    ScaledDown,
    Stopped,
    Error,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::ScaledDown | WorkerState::Stopped | WorkerState::Error)
    }
}

/// Reason passed to [`Worker::shutdown`], mapped to the corresponding
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    ScaledDown,
    External,
    Fatal,
}

impl ShutdownReason {
    fn terminal_state(self) -> WorkerState {
        match self {
            ShutdownReason::ScaledDown => WorkerState::ScaledDown,
            ShutdownReason::External => WorkerState::Stopped,
            ShutdownReason::Fatal => WorkerState::Error,
        }
    }
}

/// A read-only, point-in-time view of a worker, returned by
/// [`crate::wlm::pool::WorkerPool::workers`].
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub id: u64,
    pub device_id: i32,
    pub permanent: bool,
    pub state: WorkerState,
}

/// A worker bound to one device, draining one aggregator, driving one
/// [`ModelRuntime`].
pub struct Worker {
    id: u64,
    device_id: i32,
    permanent: bool,
    state: Arc<Mutex<WorkerState>>,
    aggregator: Arc<BatchAggregator>,
    runtime: Arc<dyn ModelRuntime>,
    cancellation: CancellationToken,
}

impl Worker {
    pub fn new(device_id: i32, permanent: bool, aggregator: Arc<BatchAggregator>, runtime: Arc<dyn ModelRuntime>) -> Self {
        Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            device_id,
            permanent,
            state: Arc::new(Mutex::new(WorkerState::Starting)),
            aggregator,
            runtime,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            id: self.id,
            device_id: self.device_id,
            permanent: self.permanent,
            state: *self.state.lock(),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    /// Signal shutdown. Idempotent: only the first call (per worker) moves
    /// the state to a terminal value; later calls are no-ops.
    pub fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return;
            }
            *state = reason.terminal_state();
        }
        self.aggregator.drain_flag().store(true, Ordering::Release);
        self.cancellation.cancel();
    }

    fn set_state(&self, new: WorkerState) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = new;
        }
    }

    /// Run the worker's main loop until it self-terminates, is shut down,
    /// or hits a fatal runtime error.
    ///
    /// Takes `Arc<Self>` rather than `self` so the owning pool can retain a
    /// handle (for `shutdown`/introspection) while the loop runs as a
    /// separate task.
    pub async fn run(self: Arc<Self>) {
        self.runtime.on_worker_start(self.device_id).await;
        self.set_state(WorkerState::Waiting);

        loop {
            if self.state().is_terminal() {
                break;
            }

            let batch = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break,
                batch = self.aggregator.next_batch() => batch,
            };

            if batch.is_empty() {
                if !self.permanent {
                    self.shutdown(ShutdownReason::ScaledDown);
                    break;
                }
                // Permanent aggregator should not yield empty batches under
                // normal operation; treat it as a spurious wakeup and retry.
                continue;
            }

            self.set_state(WorkerState::Running);

            let inputs: Vec<bytes::Bytes> = batch.iter().map(|j| j.input().clone()).collect();
            match self.runtime.predict(&inputs, self.device_id).await {
                Ok(outputs) => {
                    complete_batch_ok(batch, outputs);
                }
                Err(failure) if failure.fatal => {
                    tracing::error!(worker_id = self.id, device_id = self.device_id, "{failure}");
                    fail_batch(batch, crate::error::WlmError::WorkerFatal(failure.message));
                    self.shutdown(ShutdownReason::Fatal);
                    break;
                }
                Err(failure) => {
                    tracing::warn!(worker_id = self.id, device_id = self.device_id, "{failure}");
                    fail_batch(batch, crate::error::WlmError::BatchFailed(failure.message));
                }
            }

            if self.state().is_terminal() {
                break;
            }
            self.set_state(WorkerState::Waiting);
        }

        self.runtime.on_worker_stop(self.device_id).await;
    }
}

fn complete_batch_ok(batch: Vec<Job>, mut outputs: Vec<crate::wlm::job::JobOutput>) {
    if outputs.len() != batch.len() {
        // Runtime returned a mismatched count: treat as a batch-level
        // failure rather than silently mis-pairing results.
        let err = crate::error::WlmError::BatchFailed(format!(
            "runtime returned {} outputs for a batch of {}",
            outputs.len(),
            batch.len()
        ));
        fail_batch(batch, err);
        return;
    }
    for job in batch.into_iter().rev() {
        let output = outputs.pop().expect("length checked above");
        job.succeed(output);
    }
}

fn fail_batch(batch: Vec<Job>, err: crate::error::WlmError) {
    for job in batch {
        job.fail(err.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wlm::queue::JobQueue;
    use crate::wlm::runtime::testing::{ScriptedRuntime, Scripted};
    use bytes::Bytes;
    use std::time::Duration;

    fn make_worker(permanent: bool, runtime: Arc<ScriptedRuntime>) -> (Arc<Worker>, Arc<JobQueue>) {
        let queue = Arc::new(JobQueue::new(8));
        let agg = Arc::new(BatchAggregator::new(queue.clone(), 4, Duration::from_millis(50)));
        let worker = Arc::new(Worker::new(-1, permanent, agg, runtime));
        (worker, queue)
    }

    #[tokio::test]
    async fn test_permanent_worker_processes_batch_and_waits() {
        let runtime = ScriptedRuntime::echo();
        let (worker, queue) = make_worker(true, runtime.clone());

        let (job, rx) = Job::new(Bytes::from_static(b"hello"));
        queue.offer("m", job, Duration::from_millis(100)).await.unwrap();

        let handle = tokio::spawn(worker.run());
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap(), Bytes::from_static(b"hello"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
    }

    #[tokio::test]
    async fn test_transient_worker_self_terminates_on_empty_batch() {
        let runtime = ScriptedRuntime::echo();
        let (worker, _queue) = make_worker(false, runtime);
        worker.run().await;
    }

    #[tokio::test]
    async fn test_fatal_error_transitions_to_error_and_fails_batch() {
        let runtime = Arc::new(ScriptedRuntime::new(vec![Scripted::Fatal("device lost".into())]));
        let (worker, queue) = make_worker(true, runtime);

        let (job, rx) = Job::new(Bytes::from_static(b"x"));
        queue.offer("m", job, Duration::from_millis(100)).await.unwrap();

        worker.run().await;

        let outcome = rx.await.unwrap();
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_recoverable_error_returns_to_waiting() {
        let runtime = Arc::new(ScriptedRuntime::new(vec![
            Scripted::Recoverable("transient glitch".into()),
            Scripted::Ok(vec![Bytes::from_static(b"ok")]),
        ]));
        let (worker, queue) = make_worker(true, runtime);

        let (job1, rx1) = Job::new(Bytes::from_static(b"a"));
        queue.offer("m", job1, Duration::from_millis(100)).await.unwrap();

        let handle = tokio::spawn(worker.run());
        let outcome1 = rx1.await.unwrap();
        assert!(outcome1.is_err());

        let queue2 = queue.clone();
        let (job2, rx2) = Job::new(Bytes::from_static(b"b"));
        queue2.offer("m", job2, Duration::from_millis(200)).await.unwrap();
        let outcome2 = rx2.await.unwrap();
        assert_eq!(outcome2.unwrap(), Bytes::from_static(b"ok"));

        handle.abort();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let runtime = ScriptedRuntime::echo();
        let (worker, _queue) = make_worker(true, runtime);
        worker.shutdown(ShutdownReason::External);
        let state_after_first = worker.state();
        worker.shutdown(ShutdownReason::Fatal);
        assert_eq!(worker.state(), state_after_first);
        assert_eq!(state_after_first, WorkerState::Stopped);
    }
}

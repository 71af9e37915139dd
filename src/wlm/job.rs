//! The submitted unit of work.

use bytes::Bytes;
use std::time::Instant;
use tokio::sync::oneshot;

use crate::error::WlmError;

/// Opaque output produced by the model runtime for a single job.
pub type JobOutput = Bytes;

/// The outcome delivered through a job's completion sink.
pub type JobOutcome = Result<JobOutput, WlmError>;

/// A single-use completion sink.
///
/// Exactly one of [`CompletionSink::succeed`] or [`CompletionSink::fail`] is
/// called for every job that reaches a worker. Both consume `self`, so the
/// "satisfied at most once" invariant is enforced by the type system rather
/// than by a runtime check.
pub struct CompletionSink {
    tx: oneshot::Sender<JobOutcome>,
}

impl CompletionSink {
    /// Satisfy the sink with a successful result.
    pub fn succeed(self, output: JobOutput) {
        // The receiver may already be gone if the submitter abandoned the
        // wait; that's a normal outcome, not an error worth logging.
        let _ = self.tx.send(Ok(output));
    }

    /// Satisfy the sink with an error.
    pub fn fail(self, err: WlmError) {
        let _ = self.tx.send(Err(err));
    }
}

/// A submitted inference request.
///
/// Immutable once constructed: the submitter hands ownership to a
/// [`crate::wlm::queue::JobQueue`] and no longer mutates it.
pub struct Job {
    input: Bytes,
    enqueued_at: Instant,
    completion: CompletionSink,
}

impl Job {
    /// Create a new job, returning it paired with the receiver half the
    /// submitter awaits for the outcome.
    pub fn new(input: Bytes) -> (Self, oneshot::Receiver<JobOutcome>) {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            input,
            enqueued_at: Instant::now(),
            completion: CompletionSink { tx },
        };
        (job, rx)
    }

    pub fn input(&self) -> &Bytes {
        &self.input
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Satisfy this job's completion with a successful result, consuming it.
    pub fn succeed(self, output: JobOutput) {
        self.completion.succeed(output);
    }

    /// Satisfy this job's completion with an error, consuming it.
    pub fn fail(self, err: WlmError) {
        self.completion.fail(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_job_succeed_delivers_output() {
        let (job, rx) = Job::new(Bytes::from_static(b"input"));
        job.succeed(Bytes::from_static(b"output"));
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap(), Bytes::from_static(b"output"));
    }

    #[tokio::test]
    async fn test_job_fail_delivers_error() {
        let (job, rx) = Job::new(Bytes::from_static(b"input"));
        job.fail(WlmError::WorkerFatal("boom".into()));
        let outcome = rx.await.unwrap();
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_panic_completion() {
        let (job, rx) = Job::new(Bytes::from_static(b"input"));
        drop(rx);
        job.succeed(Bytes::from_static(b"output"));
    }
}

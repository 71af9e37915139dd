//! The model-execution contract a worker drives.

use async_trait::async_trait;

use crate::wlm::job::JobOutput;

/// An error surfaced by a [`ModelRuntime`].
///
/// `fatal` distinguishes a batch that simply failed (the worker logs it and
/// keeps running) from a runtime that has entered a state it cannot recover
/// from (the worker transitions to `Stopped` and is not replaced in place).
#[derive(Debug, Clone)]
pub struct RuntimeFailure {
    pub message: String,
    pub fatal: bool,
}

impl RuntimeFailure {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self { message: message.into(), fatal: false }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), fatal: true }
    }
}

impl std::fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RuntimeFailure {}

/// The engine a [`crate::wlm::worker::Worker`] drives to actually execute a
/// batch of inputs.
///
/// Implementations own whatever device/session state the underlying model
/// needs; `device` tells the runtime which device index (from the pool's
/// round-robin assignment) it should bind to, or `-1` if device assignment
/// is disabled for this model.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Run a batch of inputs, returning one output per input in order.
    async fn predict(&self, inputs: &[bytes::Bytes], device: i32) -> Result<Vec<JobOutput>, RuntimeFailure>;

    /// Called once, before a worker's first `predict` call.
    async fn on_worker_start(&self, _device: i32) {}

    /// Called once, after a worker stops (normally or fatally).
    async fn on_worker_stop(&self, _device: i32) {}
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    //! A scriptable [`ModelRuntime`] double for exercising workers and pools
    //! without a real inference backend.

    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One scripted response to the next `predict` call.
    #[derive(Clone)]
    pub enum Scripted {
        Ok(Vec<JobOutput>),
        Recoverable(String),
        Fatal(String),
        /// Sleep before resolving, to test timeout/delay interactions.
        Delay(std::time::Duration, Box<Scripted>),
    }

    /// A [`ModelRuntime`] driven by a preloaded script of responses.
    ///
    /// Calls past the end of the script repeat the last entry, or echo the
    /// input back as output if the script was empty.
    pub struct ScriptedRuntime {
        script: Mutex<Vec<Scripted>>,
        call_count: AtomicUsize,
        started: AtomicUsize,
        stopped: AtomicUsize,
        observed_batch_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedRuntime {
        pub fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script),
                call_count: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
                stopped: AtomicUsize::new(0),
                observed_batch_sizes: Mutex::new(Vec::new()),
            }
        }

        pub fn echo() -> Arc<Self> {
            Arc::new(Self::new(Vec::new()))
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn start_count(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        pub fn stop_count(&self) -> usize {
            self.stopped.load(Ordering::SeqCst)
        }

        /// The length of `inputs` observed on each `predict` call, in order.
        pub fn observed_batch_sizes(&self) -> Vec<usize> {
            self.observed_batch_sizes.lock().clone()
        }
    }

    #[async_trait]
    impl ModelRuntime for ScriptedRuntime {
        async fn predict(&self, inputs: &[bytes::Bytes], _device: i32) -> Result<Vec<JobOutput>, RuntimeFailure> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.observed_batch_sizes.lock().push(inputs.len());

            let next = {
                let mut guard = self.script.lock();
                if guard.is_empty() {
                    None
                } else if guard.len() == 1 {
                    Some(guard[0].clone())
                } else {
                    Some(guard.remove(0))
                }
            };

            resolve(next, inputs).await
        }

        async fn on_worker_start(&self, _device: i32) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_worker_stop(&self, _device: i32) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn resolve<'a>(
        scripted: Option<Scripted>,
        inputs: &'a [bytes::Bytes],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<JobOutput>, RuntimeFailure>> + Send + 'a>> {
        Box::pin(async move {
            match scripted {
                None => Ok(inputs.to_vec()),
                Some(Scripted::Ok(outputs)) => Ok(outputs),
                Some(Scripted::Recoverable(msg)) => Err(RuntimeFailure::recoverable(msg)),
                Some(Scripted::Fatal(msg)) => Err(RuntimeFailure::fatal(msg)),
                Some(Scripted::Delay(dur, inner)) => {
                    tokio::time::sleep(dur).await;
                    resolve(Some(*inner), inputs).await
                }
            }
        })
    }
}

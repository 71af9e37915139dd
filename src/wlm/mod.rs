//! The dispatch/scaling engine: job queues, batching, worker pools, and
//! the top-level manager that ties them together.

pub mod aggregator;
pub mod device;
pub mod job;
pub mod manager;
pub mod pool;
pub mod queue;
pub mod runtime;
pub mod worker;

pub use aggregator::BatchAggregator;
pub use device::DeviceAssigner;
pub use job::{CompletionSink, Job, JobOutcome, JobOutput};
pub use manager::{ModelSpec, WorkloadManager};
pub use pool::{PoolSnapshot, WorkerPool};
pub use queue::JobQueue;
pub use runtime::{ModelRuntime, RuntimeFailure};
pub use worker::{ShutdownReason, Worker, WorkerHandle, WorkerState};

//! Inference-serving workload manager: per-model job queues, a batching
//! aggregator, and a two-tier (permanent/transient) worker pool that scales
//! between configured bounds and assigns workers to devices round-robin.

pub mod config;
pub mod error;
pub mod logging;
pub mod panic_hook;
pub mod wlm;

pub use error::{Result, WlmError};
pub use wlm::{ModelRuntime, RuntimeFailure, WorkloadManager};

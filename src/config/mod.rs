//! Per-model configuration.
//!
//! `ModelInfo` is supplied by an external loader (CLI flags, a config file,
//! a control-plane API) and is read-only once it reaches the dispatch core.
//! Validation happens once, at construction, rather than deep inside the
//! submit/scale-up path.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::WlmError;

/// Descriptor for one served model.
///
/// `name` is the unique key the [`crate::wlm::WorkloadManager`] uses to look
/// up the model's pool. All other fields tune its queue and worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub min_workers: usize,
    pub max_workers: usize,
    pub batch_size: usize,
    /// Maximum batch delay, in milliseconds.
    ///
    /// Stored as milliseconds (rather than `Duration`) so the descriptor
    /// round-trips cleanly through `serde_json` config files.
    pub max_batch_delay_ms: u64,
    pub queue_size: usize,
}

impl ModelInfo {
    /// Construct a validated `ModelInfo`.
    ///
    /// Rejects `min_workers > max_workers`, `batch_size == 0` and
    /// `queue_size == 0` up front, so a malformed descriptor never reaches
    /// the scaling path.
    pub fn new(
        name: impl Into<String>,
        min_workers: usize,
        max_workers: usize,
        batch_size: usize,
        max_batch_delay_ms: u64,
        queue_size: usize,
    ) -> Result<Self, WlmError> {
        let name = name.into();

        if min_workers > max_workers {
            return Err(WlmError::invalid_model_info(
                &name,
                format!("min_workers ({min_workers}) > max_workers ({max_workers})"),
            ));
        }
        if batch_size == 0 {
            return Err(WlmError::invalid_model_info(&name, "batch_size must be >= 1"));
        }
        if queue_size == 0 {
            return Err(WlmError::invalid_model_info(&name, "queue_size must be >= 1"));
        }

        Ok(Self {
            name,
            min_workers,
            max_workers,
            batch_size,
            max_batch_delay_ms,
            queue_size,
        })
    }

    pub fn max_batch_delay(&self) -> Duration {
        Duration::from_millis(self.max_batch_delay_ms)
    }
}

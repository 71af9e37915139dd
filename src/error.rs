//! Crate-wide error types.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, WlmError>;

/// Errors produced by the workload manager's internal plumbing.
///
/// None of these ever escape [`crate::wlm::WorkloadManager::submit`] or
/// [`crate::wlm::WorkloadManager::model_changed`] as a thrown error — the
/// dispatch layer converts every case here into the externally-visible
/// `bool` + log-entry contract described by the design.
#[derive(Error, Debug, Clone)]
pub enum WlmError {
    #[error("queue is full for model '{model}'")]
    QueueFull { model: String },

    #[error("scale-up capacity exceeded for model '{model}': already at {max} workers")]
    ScaleCapacityExceeded { model: String, max: usize },

    #[error("admission for model '{model}' was interrupted while waiting for capacity")]
    AdmissionInterrupted { model: String },

    #[error("invalid model descriptor for '{name}': {reason}")]
    InvalidModelInfo { name: String, reason: String },

    #[error("model not found: '{0}'")]
    ModelNotFound(String),

    #[error("worker fatal error: {0}")]
    WorkerFatal(String),

    #[error("batch failed: {0}")]
    BatchFailed(String),
}

impl WlmError {
    pub fn invalid_model_info(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidModelInfo {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

//! Round-robin device assignment for a single model's pool.

use std::sync::atomic::{AtomicI32, Ordering};

/// Hands out device indices `0..gpu_count` in round-robin order.
///
/// When `gpu_count` is `0` (no GPUs configured, or the model runs CPU-only),
/// every call returns `-1` — callers treat that as "no device assignment".
pub struct DeviceAssigner {
    gpu_count: i32,
    cursor: AtomicI32,
}

impl DeviceAssigner {
    pub fn new(gpu_count: usize) -> Self {
        Self {
            gpu_count: gpu_count as i32,
            cursor: AtomicI32::new(0),
        }
    }

    /// Return the next device index, advancing the cursor.
    pub fn next(&self) -> i32 {
        if self.gpu_count == 0 {
            return -1;
        }
        let prev = self.cursor.fetch_add(1, Ordering::Relaxed);
        prev % self.gpu_count
    }
}

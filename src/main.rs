//! Demo binary: wires logging, a workload manager, and a toy runtime, then
//! serves until ctrl-c / SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use modelmux::config::ModelInfo;
use modelmux::wlm::{JobOutput, ModelRuntime, RuntimeFailure, WorkloadManager};

/// A placeholder runtime that echoes its input after a fixed "inference"
/// delay. Real deployments swap this for an engine that actually loads
/// weights and runs a forward pass.
struct EchoRuntime {
    delay: Duration,
}

#[async_trait]
impl ModelRuntime for EchoRuntime {
    async fn predict(&self, inputs: &[Bytes], device: i32) -> Result<Vec<JobOutput>, RuntimeFailure> {
        tokio::time::sleep(self.delay).await;
        tracing::debug!(device, batch_size = inputs.len(), "ran batch");
        Ok(inputs.to_vec())
    }

    async fn on_worker_start(&self, device: i32) {
        tracing::info!(device, "worker starting");
    }

    async fn on_worker_stop(&self, device: i32) {
        tracing::info!(device, "worker stopped");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = modelmux::logging::init_logging("./logs")?;
    modelmux::panic_hook::install();

    let manager = Arc::new(WorkloadManager::new(0));

    let model = ModelInfo::new("demo", 2, 4, 8, 50, 64)?;
    let runtime: Arc<dyn ModelRuntime> = Arc::new(EchoRuntime { delay: Duration::from_millis(20) });
    manager.model_changed(model, runtime).await;

    tracing::info!("workload manager running, press ctrl-c to shut down");

    wait_for_shutdown_signal().await;

    tracing::info!("shutting down");
    manager.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

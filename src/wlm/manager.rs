//! Top-level dispatch and scaling engine.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ModelInfo;
use crate::error::WlmError;
use crate::wlm::aggregator::BatchAggregator;
use crate::wlm::device::DeviceAssigner;
use crate::wlm::job::Job;
use crate::wlm::pool::WorkerPool;
use crate::wlm::runtime::ModelRuntime;
use crate::wlm::worker::{ShutdownReason, Worker, WorkerHandle};

/// A model descriptor paired with the runtime that executes its batches.
///
/// Registered once via [`WorkloadManager::model_changed`]; looked up by
/// name on every `submit`.
#[derive(Clone)]
pub struct ModelSpec {
    pub info: ModelInfo,
    pub runtime: Arc<dyn ModelRuntime>,
}

/// Routes submissions to per-model pools, scales each pool between its
/// configured bounds, and assigns workers to devices round-robin.
///
/// All state lives in this instance: two `DashMap`s (pools, per-model
/// locks) plus one shared device cursor and one shared task executor.
/// Nothing is global.
pub struct WorkloadManager {
    pools: DashMap<String, Arc<WorkerPool>>,
    specs: DashMap<String, ModelSpec>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
    devices: DeviceAssigner,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkloadManager {
    pub fn new(gpu_count: usize) -> Self {
        Self {
            pools: DashMap::new(),
            specs: DashMap::new(),
            locks: DashMap::new(),
            devices: DeviceAssigner::new(gpu_count),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    fn model_lock(&self, model_name: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(model_name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .value()
            .clone()
    }

    /// Resolve (or create) `info.name`'s pool, growing its worker-task
    /// permit budget to `info.max_workers` if that bound has increased
    /// since the pool was created.
    fn get_or_create_pool(&self, info: &ModelInfo) -> Arc<WorkerPool> {
        let pool = self
            .pools
            .entry(info.name.clone())
            .or_insert_with(|| Arc::new(WorkerPool::new(info.queue_size)))
            .value()
            .clone();
        pool.ensure_capacity(info.max_workers);
        pool
    }

    /// Admission: place `job` on `model_name`'s queue, scaling up once if
    /// the queue is momentarily full.
    ///
    /// Never propagates an internal error to the caller — every failure
    /// mode collapses to `false` plus a log entry, matching the dispatch
    /// layer's external contract.
    pub async fn submit(&self, model_name: &str, job: Job) -> bool {
        self.submit_inner(model_name, job, None).await
    }

    /// Same as [`submit`](Self::submit), but the wait for capacity after a
    /// scale-up attempt also races `cancel`: if the token fires first, the
    /// job is rejected (`ADMISSION_INTERRUPTED`) and its completion is left
    /// untouched, the same as any other admission-time rejection.
    pub async fn submit_cancellable(&self, model_name: &str, job: Job, cancel: &CancellationToken) -> bool {
        self.submit_inner(model_name, job, Some(cancel)).await
    }

    async fn submit_inner(&self, model_name: &str, job: Job, cancel: Option<&CancellationToken>) -> bool {
        let spec = match self.specs.get(model_name) {
            Some(spec) => spec.value().clone(),
            None => {
                tracing::warn!(model = model_name, "submit rejected: model not registered");
                return false;
            }
        };

        let pool = self.get_or_create_pool(&spec.info);

        if pool.running_worker_count() == 0 {
            tracing::info!(model = model_name, "submit rejected: no running workers");
            return false;
        }

        let job = match pool.queue().offer(model_name, job, Duration::ZERO).await {
            Ok(()) => return true,
            Err((job, _)) => job,
        };

        let lock = self.model_lock(model_name);
        let _guard = lock.lock().await;

        if let Err(err) = self.scale_up(&spec, &pool).await {
            tracing::warn!(model = model_name, %err, "scale-up did not add capacity");
        }

        let retry = pool.queue().offer(model_name, job, spec.info.max_batch_delay());
        let Some(cancel) = cancel else {
            return match retry.await {
                Ok(()) => true,
                Err((_job, err)) => {
                    tracing::info!(model = model_name, %err, "submit rejected after scale-up attempt");
                    false
                }
            };
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let err = WlmError::AdmissionInterrupted { model: model_name.to_string() };
                tracing::info!(model = model_name, %err, "submit rejected: admission wait interrupted");
                false
            }
            result = retry => match result {
                Ok(()) => true,
                Err((_job, err)) => {
                    tracing::info!(model = model_name, %err, "submit rejected after scale-up attempt");
                    false
                }
            },
        }
    }

    /// Spawn one transient worker if under `maxWorkers`; never a burst.
    async fn scale_up(&self, spec: &ModelSpec, pool: &Arc<WorkerPool>) -> Result<(), WlmError> {
        let running = pool.running_worker_count();
        if running >= spec.info.max_workers {
            return Err(WlmError::ScaleCapacityExceeded {
                model: spec.info.name.clone(),
                max: spec.info.max_workers,
            });
        }
        self.spawn_worker(spec, pool, false).await;
        Ok(())
    }

    /// Allocate a device, build the appropriate aggregator variant, append
    /// the worker to the pool, and submit its task to the shared executor.
    async fn spawn_worker(&self, spec: &ModelSpec, pool: &Arc<WorkerPool>, permanent: bool) {
        let device_id = self.devices.next();
        let aggregator = Arc::new(BatchAggregator::new(pool.queue().clone(), spec.info.batch_size, spec.info.max_batch_delay()));
        let worker = Arc::new(Worker::new(device_id, permanent, aggregator, spec.runtime.clone()));
        pool.push_worker(worker.clone());

        let permit = pool.permits().clone().acquire_owned().await.expect("semaphore is never closed");
        let mut tasks = self.tasks.lock();
        if let Some(tasks) = tasks.as_mut() {
            tasks.spawn(async move {
                let _permit = permit;
                worker.run().await;
            });
        }
    }

    /// Reconcile `info`'s pool to its configured permanent-worker count.
    ///
    /// Idempotent: calling this twice with an unchanged `info` leaves the
    /// pool in the same state as a single call.
    pub async fn model_changed(&self, info: ModelInfo, runtime: Arc<dyn ModelRuntime>) {
        let lock = self.model_lock(&info.name);
        let _guard = lock.lock().await;

        let spec = ModelSpec { info: info.clone(), runtime };
        self.specs.insert(info.name.clone(), spec.clone());

        let pool = self.get_or_create_pool(&info);
        pool.cleanup();

        let current_permanent = pool.non_terminal_permanent();
        let current_count = current_permanent.len();

        if current_count < info.min_workers {
            for _ in current_count..info.min_workers {
                self.spawn_worker(&spec, &pool, true).await;
            }
        } else if current_count > info.min_workers {
            for worker in &current_permanent[info.min_workers..] {
                worker.shutdown(ShutdownReason::ScaledDown);
            }
            pool.cleanup();
        }

        let snapshot = pool.debug_snapshot();
        tracing::debug!(
            model = %info.name,
            permanent = snapshot.permanent,
            transient = snapshot.transient,
            queue_len = snapshot.queue_len,
            queue_capacity = snapshot.queue_capacity,
            "reconciled pool"
        );
    }

    /// Explicitly drop `model_name`'s pool and spec. Unlike `model_changed`
    /// with `minWorkers == 0`, this is the only path that removes a pool.
    pub async fn remove_model(&self, model_name: &str) -> bool {
        let lock = self.model_lock(model_name);
        let _guard = lock.lock().await;

        if let Some((_, pool)) = self.pools.remove(model_name) {
            pool.shutdown_all();
            self.specs.remove(model_name);
            true
        } else {
            false
        }
    }

    pub fn workers(&self, model_name: &str) -> Vec<WorkerHandle> {
        match self.pools.get(model_name) {
            Some(pool) => pool.workers(),
            None => Vec::new(),
        }
    }

    /// Count of non-terminal workers; triggers `cleanup()` as a side effect.
    pub fn running_worker_count(&self, model_name: &str) -> usize {
        match self.pools.get(model_name) {
            Some(pool) => {
                pool.cleanup();
                pool.running_worker_count()
            }
            None => 0,
        }
    }

    /// Idempotent: signals every worker, then awaits the shared executor's
    /// drain. After this returns, no worker is `STARTING`, `WAITING`, or
    /// `RUNNING`.
    pub async fn shutdown(&self) {
        for pool in self.pools.iter() {
            pool.shutdown_all();
        }

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };
        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }
    }
}

//! Scheduler manager.
//!
//! [`JobManager`] is the single owner of the active worker set. Every mutation
//! and iteration of the set happens under one lock, which is what keeps the
//! set at most one worker per job even when callers race on the same job.
//! Workers are only ever joined after the lock has been released.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::model::{Job, JobExecution};
use crate::pipeline::ExecutionPipeline;
use crate::schedule::parse_schedule;
use crate::worker::{WorkerConfig, Workload};

pub(crate) struct ManagerInner {
    workers: Mutex<Vec<Arc<Workload>>>,
    worker_nr: AtomicU64,
    stopping: AtomicBool,
    pipeline: Arc<ExecutionPipeline>,
    config: WorkerConfig,
}

impl ManagerInner {
    /// Remove exactly `worker` from the set, leaving any replacement alone.
    pub(crate) async fn deregister(&self, worker: &Arc<Workload>) {
        let mut workers = self.workers.lock().await;
        workers.retain(|w| !Arc::ptr_eq(w, worker));
        debug!("{} deregistered", worker.name());
    }
}

/// Owns one worker per active job.
pub struct JobManager {
    inner: Arc<ManagerInner>,
}

impl JobManager {
    pub fn new(pipeline: Arc<ExecutionPipeline>, config: WorkerConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                workers: Mutex::new(Vec::new()),
                worker_nr: AtomicU64::new(0),
                stopping: AtomicBool::new(false),
                pipeline,
                config,
            }),
        }
    }

    pub fn pipeline(&self) -> &Arc<ExecutionPipeline> {
        &self.inner.pipeline
    }

    fn build_worker(
        &self,
        job: Job,
        execution: Option<JobExecution>,
        once: bool,
    ) -> Result<Arc<Workload>, SchedulerError> {
        if !once {
            parse_schedule(&job.schedule)?;
        }

        let nr = self.inner.worker_nr.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("Worker #{}", nr);
        let span = tracing::info_span!(
            "worker",
            job_id = %job.id,
            job_name = %job.name,
            worker = %name,
        );

        let worker = Workload::new(
            job,
            execution,
            once,
            Arc::clone(&self.inner.pipeline),
            self.inner.config,
        )
        .with_name(name)
        .with_span(span)
        .with_manager(Arc::downgrade(&self.inner));
        Ok(Arc::new(worker))
    }

    /// Register a worker for `job` without starting it.
    ///
    /// Fails with `AlreadyScheduled` if the job already has a worker, and with
    /// `InvalidSchedule` if a recurring job's schedule does not parse.
    pub async fn add(
        &self,
        job: Job,
        execution: Option<JobExecution>,
        once: bool,
    ) -> Result<Arc<Workload>, SchedulerError> {
        let mut workers = self.inner.workers.lock().await;
        if workers.iter().any(|w| w.job().id == job.id) {
            return Err(SchedulerError::AlreadyScheduled(job.id));
        }

        let worker = self.build_worker(job, execution, once)?;
        info!(
            "Added {} for job '{}' ({})",
            worker.name(),
            worker.job().name,
            if once { "once" } else { "recurring" }
        );
        workers.push(Arc::clone(&worker));
        Ok(worker)
    }

    /// Start every registered worker that has not been started yet.
    pub async fn start(&self) {
        let workers = self.inner.workers.lock().await;
        for worker in workers.iter() {
            if worker.start() {
                debug!("Started {}", worker.name());
            }
        }
    }

    /// Start the worker of `job_id`. Returns false if there is none or it was
    /// already started.
    pub async fn start_job(&self, job_id: &str) -> bool {
        let workers = self.inner.workers.lock().await;
        workers
            .iter()
            .find(|w| w.job().id == job_id)
            .is_some_and(|w| w.start())
    }

    /// Stop and remove the worker of `job_id`. Returns false if there is none.
    pub async fn stop_job(&self, job_id: &str) -> bool {
        let removed = {
            let mut workers = self.inner.workers.lock().await;
            workers
                .iter()
                .position(|w| w.job().id == job_id)
                .map(|idx| workers.remove(idx))
        };

        match removed {
            Some(worker) => {
                worker.stop().await;
                info!("Stopped {} of job '{}'", worker.name(), job_id);
                true
            }
            None => false,
        }
    }

    /// Swap the worker of `job` for a fresh one using the new configuration.
    ///
    /// Removal, registration and start happen under the lock; the old worker is
    /// joined afterwards, so a run it has in flight finishes undisturbed.
    pub async fn replace_job(&self, job: Job) -> Result<(), SchedulerError> {
        let old = {
            let mut workers = self.inner.workers.lock().await;
            let worker = self.build_worker(job, None, false)?;

            let old = workers
                .iter()
                .position(|w| w.job().id == worker.job().id)
                .map(|idx| workers.remove(idx));
            if let Some(old) = &old {
                old.signal_stop();
            }

            workers.push(Arc::clone(&worker));
            worker.start();
            info!("Replaced worker of job '{}' with {}", worker.job().name, worker.name());
            old
        };

        if let Some(old) = old {
            old.stop().await;
        }
        Ok(())
    }

    /// Stop every worker and clear the set.
    ///
    /// Returns false without doing anything if a stop is already in progress.
    pub async fn stop(&self) -> bool {
        if self.inner.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }

        let workers = std::mem::take(&mut *self.inner.workers.lock().await);
        for worker in &workers {
            worker.signal_stop();
        }
        for worker in &workers {
            worker.stop().await;
        }
        info!("Stopped {} worker(s)", workers.len());

        self.inner.stopping.store(false, Ordering::SeqCst);
        true
    }

    /// Jobs currently scheduled.
    pub async fn list(&self) -> Vec<Job> {
        let workers = self.inner.workers.lock().await;
        workers.iter().map(|w| w.job().clone()).collect()
    }

    /// One "<job> next run at <time>" line per worker.
    pub async fn list_summary(&self) -> Vec<String> {
        let workers = self.inner.workers.lock().await;
        workers.iter().map(|w| w.summary()).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.workers.lock().await.is_empty()
    }

    pub async fn is_scheduled(&self, job_id: &str) -> bool {
        let workers = self.inner.workers.lock().await;
        workers.iter().any(|w| w.job().id == job_id)
    }

    /// Next run display string of `job_id`'s worker.
    pub async fn next_execution(&self, job_id: &str) -> Option<String> {
        let workers = self.inner.workers.lock().await;
        workers
            .iter()
            .find(|w| w.job().id == job_id)
            .and_then(|w| w.next_execution_time())
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        if let Ok(workers) = self.inner.workers.try_lock() {
            for worker in workers.iter() {
                worker.signal_stop();
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

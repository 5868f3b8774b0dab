//! Job worker.
//!
//! A [`Workload`] owns the run loop of one job. In recurring mode it sleeps
//! until the next cron match, runs the job and repeats; in one-shot mode it
//! runs the job once, deregisters from its manager and exits. Failed cycles
//! are logged and retried after a fixed backoff; only a stop ends the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

use autoplay_config::SchedulerConfig;

use crate::error::{ErrorClass, SchedulerError};
use crate::manager::ManagerInner;
use crate::model::{Job, JobExecution};
use crate::pipeline::ExecutionPipeline;
use crate::schedule::{format_execution_time, time_until_next};

/// Timing knobs shared by all workers of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Backoff after a failed cycle.
    pub fail_sleep: Duration,
    /// Bounded wait when joining a stopped worker.
    pub join_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            fail_sleep: Duration::from_secs(5),
            join_timeout: Duration::from_secs(3),
        }
    }
}

impl WorkerConfig {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            fail_sleep: Duration::from_secs(config.fail_sleep_secs),
            join_timeout: Duration::from_secs(config.join_timeout_secs),
        }
    }
}

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Started,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Created => write!(f, "created"),
            WorkerState::Started => write!(f, "started"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Worker running a single job.
pub struct Workload {
    job: Job,
    /// Execution for the next run; taken by the first run.
    execution: Mutex<Option<JobExecution>>,
    once: bool,
    name: String,
    started: AtomicBool,
    stopped: AtomicBool,
    cancel: CancellationToken,
    next_execution: RwLock<Option<String>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    pipeline: Arc<ExecutionPipeline>,
    manager: Weak<ManagerInner>,
    config: WorkerConfig,
    span: Span,
}

impl Workload {
    pub fn new(
        job: Job,
        execution: Option<JobExecution>,
        once: bool,
        pipeline: Arc<ExecutionPipeline>,
        config: WorkerConfig,
    ) -> Self {
        let span = tracing::info_span!("worker", job_id = %job.id, job_name = %job.name);
        Self {
            job,
            execution: Mutex::new(execution),
            once,
            name: "Worker".to_string(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            next_execution: RwLock::new(None),
            handle: Mutex::new(None),
            pipeline,
            manager: Weak::new(),
            config,
            span,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Span every event of the worker's task is recorded in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub(crate) fn with_manager(mut self, manager: Weak<ManagerInner>) -> Self {
        self.manager = manager;
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        if self.is_stopped() {
            WorkerState::Stopped
        } else if self.is_started() {
            WorkerState::Started
        } else {
            WorkerState::Created
        }
    }

    /// Display string of the next scheduled run, if one is pending.
    pub fn next_execution_time(&self) -> Option<String> {
        self.next_execution.read().clone()
    }

    /// "<job> next run at <time>" line for listings.
    pub fn summary(&self) -> String {
        format!(
            "{} next run at {}",
            self.job.name,
            self.next_execution_time().as_deref().unwrap_or("None")
        )
    }

    /// Spawn the run loop. Returns false if the worker was already started or
    /// has been stopped.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.is_stopped() || self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let worker = Arc::clone(self);
        let handle = tokio::spawn(worker.run().instrument(self.span.clone()));
        *self.handle.lock() = Some(handle);
        true
    }

    /// Raise the stop signal and join the task with a bounded wait.
    ///
    /// Returns false if the worker was already stopped. A run in flight is
    /// not interrupted; if it outlasts the join timeout a warning is logged.
    pub async fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.started.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => debug!("{} joined", self.name),
                Ok(Err(e)) => warn!("Unable to join worker {}: {}", self.name, e),
                Err(_) => warn!(
                    "Unable to join worker {} within {:?}",
                    self.name, self.config.join_timeout
                ),
            }
        }
        true
    }

    /// Wait until the stop signal is raised. A one-shot worker raises it
    /// after its run, once it has left the manager.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await;
    }

    /// Raise the stop signal without joining.
    pub(crate) fn signal_stop(&self) {
        self.cancel.cancel();
    }

    async fn run(self: Arc<Self>) {
        info!("{} started", self.name);
        if self.once {
            self.run_once().await;
        } else {
            self.run_recurring().await;
        }
        *self.next_execution.write() = None;
        info!("{} exited", self.name);
    }

    async fn run_once(self: &Arc<Self>) {
        if !self.cancel.is_cancelled() {
            let execution = self.execution.lock().take();
            match self.pipeline.execute(&self.job, execution).await {
                Ok(execution) => info!(
                    "Execution {} of job '{}' ended {}",
                    execution.id, self.job.name, execution.status
                ),
                Err(e) => self.log_failure(&e),
            }
        }

        self.stopped.store(true, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        if let Some(manager) = self.manager.upgrade() {
            manager.deregister(self).await;
        }
        self.cancel.cancel();
    }

    async fn run_recurring(&self) {
        while !self.cancel.is_cancelled() {
            let wait = match self.schedule_next() {
                Ok(wait) => wait,
                Err(e) => {
                    self.log_failure(&e);
                    if !self.backoff().await {
                        break;
                    }
                    continue;
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let execution = self.execution.lock().take();
            match self.pipeline.execute(&self.job, execution).await {
                Ok(execution) => info!(
                    "Execution {} of job '{}' ended {}",
                    execution.id, self.job.name, execution.status
                ),
                Err(e) => {
                    self.log_failure(&e);
                    if !self.backoff().await {
                        break;
                    }
                }
            }
        }
    }

    /// Compute and record the next run, returning the wait until it.
    fn schedule_next(&self) -> Result<Duration, SchedulerError> {
        let (next, wait) = time_until_next(&self.job.schedule, Utc::now())?;
        let next_display = format_execution_time(next);
        debug!("Next run of job '{}' at {}", self.job.name, next_display);
        *self.next_execution.write() = Some(next_display);
        Ok(wait)
    }

    /// Sleep for the failure backoff. Returns false if stopped meanwhile.
    async fn backoff(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.fail_sleep) => true,
        }
    }

    fn log_failure(&self, err: &SchedulerError) {
        let kind = match err.class() {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Environment => "environment",
            ErrorClass::Unexpected => "unexpected",
        };
        error!(
            "Got {} error while running job '{}' (id {}): {}",
            kind, self.job.name, self.job.id, err
        );
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

//! # Autoplay Scheduler
//!
//! Job scheduling and execution pipeline: one worker per active job, cron-driven
//! next-run computation, the prepare / run / parse cycle and failure backoff.
//!
//! ## Components
//!
//! - [`JobManager`] owns the set of active workers (add / replace / stop / list)
//! - [`Workload`] runs one job, either once or on its cron schedule
//! - [`OptionsBuilder`] turns a job and an execution into [`RunOptions`]
//! - [`RunDirectory`] owns the temporary directory of a single run
//! - [`parse_run_result`] turns runner statistics into result records
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use autoplay_scheduler::{ExecutionPipeline, JobManager, MemoryExecutionStore, ProcessRunner, RunSettings, WorkerConfig};
//!
//! let settings = RunSettings::from_config(&config);
//! let pipeline = ExecutionPipeline::new(
//!     settings,
//!     Arc::new(ProcessRunner::new(&config.run)),
//!     Arc::new(MemoryExecutionStore::new()),
//! );
//! let manager = JobManager::new(Arc::new(pipeline), WorkerConfig::default());
//! manager.add(job, None, false).await?;
//! manager.start().await;
//! ```

pub mod env_vars;
pub mod error;
pub mod manager;
pub mod model;
pub mod options;
pub mod pipeline;
pub mod result;
pub mod run_dir;
pub mod runner;
pub mod schedule;
pub mod store;
pub mod worker;

pub use error::{ErrorClass, SchedulerError, VarSource};
pub use manager::JobManager;
pub use model::{ExecutionStatus, Job, JobExecution, JobExecutionResult, JobExecutionResultHost};
pub use options::{OptionsBuilder, PreparedRun, ProcessIsolation, RunOptions, RunSettings, RunnerMode};
pub use pipeline::ExecutionPipeline;
pub use result::parse_run_result;
pub use run_dir::RunDirectory;
pub use runner::{PlaybookRunner, ProcessRunner, RunnerOutcome, RunnerStats};
pub use store::{ExecutionStore, FileExecutionStore, MemoryExecutionStore};
pub use worker::{WorkerConfig, WorkerState, Workload};

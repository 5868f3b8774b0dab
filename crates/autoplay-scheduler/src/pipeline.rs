//! One run of a job: prepare, execute, parse, release.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::model::{Job, JobExecution};
use crate::options::{OptionsBuilder, RunSettings};
use crate::result::parse_run_result;
use crate::runner::{PlaybookRunner, RunnerOutcome};
use crate::store::ExecutionStore;

/// Drives a single execution through the run cycle.
pub struct ExecutionPipeline {
    builder: OptionsBuilder,
    runner: Arc<dyn PlaybookRunner>,
    store: Arc<dyn ExecutionStore>,
}

impl ExecutionPipeline {
    pub fn new(
        settings: RunSettings,
        runner: Arc<dyn PlaybookRunner>,
        store: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            builder: OptionsBuilder::new(settings),
            runner,
            store,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        self.builder.settings()
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Run `job` once.
    ///
    /// Without an `execution` a scheduled one is synthesised. The run directory
    /// is removed on every exit path. A runner failure still marks the
    /// execution `Failed` before the error is returned.
    pub async fn execute(
        &self,
        job: &Job,
        execution: Option<JobExecution>,
    ) -> Result<JobExecution, SchedulerError> {
        let mut execution = execution.unwrap_or_else(|| JobExecution::scheduled(job));
        let time_start = Utc::now();

        let prepared = self
            .builder
            .prepare(job, &mut execution, self.store.as_ref())
            .await?;

        let outcome = match self.runner.execute(&prepared.options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                parse_run_result(
                    &mut execution,
                    time_start,
                    &RunnerOutcome::errored_without_stats(),
                    self.store.as_ref(),
                )
                .await?;
                if let Err(release_err) = prepared.run_dir.release() {
                    warn!("Failed to remove run directory: {}", release_err);
                }
                return Err(e);
            }
        };

        parse_run_result(&mut execution, time_start, &outcome, self.store.as_ref()).await?;
        prepared.run_dir.release()?;

        debug!(
            "Execution {} of job '{}' ended {}",
            execution.id, job.name, execution.status
        );
        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionStatus;
    use crate::options::RunOptions;
    use crate::store::MemoryExecutionStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct RecordingRunner {
        fail: bool,
        seen: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl PlaybookRunner for RecordingRunner {
        async fn execute(&self, options: &RunOptions) -> Result<RunnerOutcome, SchedulerError> {
            assert!(options.private_data_dir.is_dir());
            self.seen.lock().push(options.private_data_dir.clone());
            if self.fail {
                return Err(SchedulerError::Runner("boom".to_string()));
            }
            Ok(RunnerOutcome::default())
        }
    }

    fn setup(fail: bool) -> (TempDir, Arc<RecordingRunner>, ExecutionPipeline) {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("play");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("site.yml"), "- hosts: all").unwrap();
        std::fs::write(project.join("hosts"), "web1").unwrap();

        let runner = Arc::new(RecordingRunner {
            fail,
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = ExecutionPipeline::new(
            RunSettings::new(temp.path().join("runs"), project),
            runner.clone(),
            Arc::new(MemoryExecutionStore::new()),
        );
        (temp, runner, pipeline)
    }

    fn job() -> Job {
        Job::new("1", "deploy", "* * * * *", "site.yml", "hosts")
    }

    #[tokio::test]
    async fn test_scheduled_run() {
        let (_temp, runner, pipeline) = setup(false);

        let execution = pipeline.execute(&job(), None).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Finished);
        assert_eq!(execution.comment.as_deref(), Some("Scheduled"));
        assert!(execution.result.is_some());
        let seen = runner.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists());
    }

    #[tokio::test]
    async fn test_manual_execution_is_used() {
        let (_temp, _runner, pipeline) = setup(false);
        let job = job();
        let manual = JobExecution::new(&job).with_user("alice");
        let id = manual.id;

        let execution = pipeline.execute(&job, Some(manual)).await.unwrap();
        assert_eq!(execution.id, id);
        assert_eq!(execution.user.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_runner_failure_marks_failed() {
        let (_temp, runner, pipeline) = setup(true);
        let job = job();
        let execution = JobExecution::new(&job);
        let id = execution.id;

        let err = pipeline.execute(&job, Some(execution)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Runner(_)));

        let stored = pipeline.store().load_execution(id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert!(!runner.seen.lock()[0].exists());
    }
}

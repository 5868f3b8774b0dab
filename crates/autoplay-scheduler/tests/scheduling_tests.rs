//! End-to-end scheduling tests.
//!
//! These drive a `JobManager` built from a parsed configuration against an
//! in-process runner and check the records and run directories each cycle
//! leaves behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use autoplay_config::{Config, ConfigLoader};
use autoplay_scheduler::{
    ErrorClass, ExecutionPipeline, ExecutionStatus, ExecutionStore, Job, JobExecution,
    JobExecutionResult, JobManager, MemoryExecutionStore, PlaybookRunner, RunOptions, RunSettings,
    RunnerOutcome, RunnerStats, SchedulerError, WorkerConfig,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Runner that reports every invocation and succeeds with one processed host.
struct ReportingRunner {
    tx: mpsc::UnboundedSender<RunOptions>,
}

#[async_trait]
impl PlaybookRunner for ReportingRunner {
    async fn execute(&self, options: &RunOptions) -> Result<RunnerOutcome, SchedulerError> {
        assert!(options.private_data_dir.is_dir());
        let _ = self.tx.send(options.clone());

        let mut stats = RunnerStats::default();
        stats.processed.insert("web1".to_string(), 1);
        stats.ok.insert("web1".to_string(), 3);
        Ok(RunnerOutcome {
            errored: false,
            stats,
        })
    }
}

/// Store that remembers every status an execution was saved with.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryExecutionStore,
    statuses: Mutex<Vec<(Uuid, ExecutionStatus)>>,
}

impl RecordingStore {
    fn history(&self, id: Uuid) -> Vec<ExecutionStatus> {
        self.statuses
            .lock()
            .iter()
            .filter(|(eid, _)| *eid == id)
            .map(|(_, status)| *status)
            .collect()
    }
}

#[async_trait]
impl ExecutionStore for RecordingStore {
    async fn save_execution(&self, execution: &JobExecution) -> Result<(), SchedulerError> {
        self.statuses.lock().push((execution.id, execution.status));
        self.inner.save_execution(execution).await
    }

    async fn save_result(&self, result: &JobExecutionResult) -> Result<(), SchedulerError> {
        self.inner.save_result(result).await
    }

    async fn load_execution(&self, id: Uuid) -> Result<Option<JobExecution>, SchedulerError> {
        self.inner.load_execution(id).await
    }

    async fn load_result(&self, id: Uuid) -> Result<Option<JobExecutionResult>, SchedulerError> {
        self.inner.load_result(id).await
    }

    async fn list_executions(&self, job_id: &str) -> Result<Vec<JobExecution>, SchedulerError> {
        self.inner.list_executions(job_id).await
    }
}

struct Harness {
    _temp: TempDir,
    run_path: PathBuf,
    config: Config,
    store: Arc<RecordingStore>,
    runs: mpsc::UnboundedReceiver<RunOptions>,
    manager: JobManager,
}

fn write_project(root: &Path) -> PathBuf {
    let project = root.join("play");
    std::fs::create_dir_all(project.join("inventories")).unwrap();
    std::fs::write(project.join("site.yml"), "- hosts: all\n").unwrap();
    std::fs::write(project.join("inventories").join("prod"), "web1\n").unwrap();
    project
}

fn harness(jobs: &str) -> Harness {
    let temp = TempDir::new().unwrap();
    let project = write_project(temp.path());
    let run_path = temp.path().join("runs");

    let toml = format!(
        r#"
[paths]
run = "{}"
play = "{}"

[scheduler]
fail_sleep_secs = 5
join_timeout_secs = 2

{}
"#,
        run_path.display(),
        project.display(),
        jobs
    );
    let config = ConfigLoader::load_str(&toml).unwrap();

    let (tx, runs) = mpsc::unbounded_channel();
    let store = Arc::new(RecordingStore::default());
    let pipeline = ExecutionPipeline::new(
        RunSettings::from_config(&config),
        Arc::new(ReportingRunner { tx }),
        store.clone(),
    );
    let manager = JobManager::new(
        Arc::new(pipeline),
        WorkerConfig::from_config(&config.scheduler),
    );

    Harness {
        _temp: temp,
        run_path,
        config,
        store,
        runs,
        manager,
    }
}

fn run_dirs(path: &Path) -> usize {
    std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
}

const EVERY_MINUTE: &str = r#"
[[jobs]]
id = "1"
name = "Site deploy"
schedule = "* * * * *"
playbook = "site.yml"
inventory = "inventories/prod"
"#;

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_every_minute_job_runs_one_cycle() {
    let mut h = harness(EVERY_MINUTE);
    for job in h.config.enabled_jobs() {
        h.manager.add(Job::from(job), None, false).await.unwrap();
    }
    h.manager.start().await;

    let options = tokio::time::timeout(Duration::from_secs(120), h.runs.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(h.manager.stop().await);

    assert_eq!(options.playbooks, vec!["site.yml"]);
    assert_eq!(options.inventories, vec!["inventories/prod"]);
    assert!(options.private_data_dir.starts_with(&h.run_path));
    assert!(!options.private_data_dir.exists());
    assert_eq!(run_dirs(&h.run_path), 0);

    let executions = h.store.list_executions("1").await.unwrap();
    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution.comment.as_deref(), Some("Scheduled"));
    assert_eq!(
        h.store.history(execution.id),
        vec![
            ExecutionStatus::Starting,
            ExecutionStatus::Running,
            ExecutionStatus::Finished
        ]
    );

    let result = h
        .store
        .load_result(execution.result.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!result.failed);
    assert_eq!(result.hosts.len(), 1);
    assert_eq!(result.hosts[0].tasks_ok, 3);
}

#[tokio::test]
async fn test_missing_playbook_stays_starting() {
    let mut h = harness(
        r#"
[[jobs]]
id = "2"
name = "Broken"
schedule = "* * * * *"
playbook = "missing.yml"
inventory = "inventories/prod"
"#,
    );
    let job = Job::from(h.config.job("2").unwrap());
    let worker = h.manager.add(job, None, true).await.unwrap();
    h.manager.start().await;

    tokio::time::timeout(Duration::from_secs(5), worker.stopped())
        .await
        .unwrap();

    let executions = h.store.list_executions("2").await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Starting);
    assert_eq!(h.store.history(executions[0].id), vec![ExecutionStatus::Starting]);
    assert!(executions[0].result.is_none());
    assert_eq!(run_dirs(&h.run_path), 0);
    assert!(h.runs.try_recv().is_err());
    assert!(h.manager.is_empty().await);
}

#[tokio::test]
async fn test_manual_run_with_overrides() {
    let mut h = harness(
        r#"
[[jobs]]
id = "3"
name = "Tagged deploy"
schedule = "0 3 * * *"
playbook = "site.yml"
inventory = "inventories/prod"
limit = "all"
environment_vars = "ENV=prod,REGION=eu"
"#,
    );
    let job = Job::from(h.config.job("3").unwrap());
    let execution = JobExecution::new(&job)
        .with_user("alice")
        .with_limit("web1")
        .with_environment_vars("ENV=stage");
    let id = execution.id;

    let worker = h.manager.add(job, Some(execution), true).await.unwrap();
    assert!(h.manager.start_job("3").await);
    tokio::time::timeout(Duration::from_secs(5), worker.stopped())
        .await
        .unwrap();

    let options = h.runs.recv().await.unwrap();
    assert_eq!(options.limit.as_deref(), Some("web1"));
    assert_eq!(options.env_vars["ENV"], "stage");
    assert_eq!(options.env_vars["REGION"], "eu");

    let stored = h.store.load_execution(id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Finished);
    assert_eq!(stored.user.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_malformed_env_vars_leave_no_run_dir() {
    let h = harness(EVERY_MINUTE);
    let job = Job::from(h.config.job("1").unwrap());
    let execution = JobExecution::new(&job).with_environment_vars("ENV");
    let id = execution.id;

    let err = h
        .manager
        .pipeline()
        .execute(&job, Some(execution))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Execution"));
    assert_eq!(err.class(), ErrorClass::Configuration);
    let stored = h.store.load_execution(id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Starting);
    assert_eq!(run_dirs(&h.run_path), 0);
}

#[tokio::test]
async fn test_disabled_jobs_are_not_scheduled() {
    let h = harness(
        r#"
[[jobs]]
id = "1"
name = "Active"
schedule = "0 0 1 1 *"
playbook = "site.yml"
inventory = "inventories/prod"

[[jobs]]
id = "2"
name = "Paused"
schedule = "0 0 1 1 *"
playbook = "site.yml"
inventory = "inventories/prod"
enabled = false
"#,
    );
    for job in h.config.enabled_jobs() {
        h.manager.add(Job::from(job), None, false).await.unwrap();
    }

    assert!(h.manager.is_scheduled("1").await);
    assert!(!h.manager.is_scheduled("2").await);
    assert_eq!(
        h.manager.list_summary().await,
        vec!["Active next run at None".to_string()]
    );
}

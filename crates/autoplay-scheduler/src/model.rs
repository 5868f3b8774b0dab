//! Job, execution and result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use autoplay_config::JobConfig;

use crate::error::SchedulerError;

/// Comment attached to executions synthesised by the scheduler.
pub const SCHEDULED_COMMENT: &str = "Scheduled";

/// A configured playbook job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    /// Five-field cron expression.
    pub schedule: String,
    /// Comma-separated playbook paths.
    pub playbook: String,
    /// Comma-separated inventory paths.
    pub inventory: String,
    /// Default target-limit expression.
    pub limit: Option<String>,
    /// Default `key=value,...` environment.
    pub environment_vars: Option<String>,
}

impl Job {
    /// Create a job without limit or environment.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        schedule: impl Into<String>,
        playbook: impl Into<String>,
        inventory: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schedule: schedule.into(),
            playbook: playbook.into(),
            inventory: inventory.into(),
            limit: None,
            environment_vars: None,
        }
    }

    pub fn with_limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    pub fn with_environment_vars(mut self, vars: impl Into<String>) -> Self {
        self.environment_vars = Some(vars.into());
        self
    }

    /// Playbook paths in configured order.
    pub fn playbooks(&self) -> Vec<&str> {
        split_paths(&self.playbook)
    }

    /// Inventory paths in configured order.
    pub fn inventories(&self) -> Vec<&str> {
        split_paths(&self.inventory)
    }
}

impl From<&JobConfig> for Job {
    fn from(config: &JobConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            schedule: config.schedule.clone(),
            playbook: config.playbook.clone(),
            inventory: config.inventory.clone(),
            limit: config.limit.clone(),
            environment_vars: config.environment_vars.clone(),
        }
    }
}

fn split_paths(csv: &str) -> Vec<&str> {
    csv.split(',').map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Execution lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Created, not picked up yet.
    Waiting,
    /// Run preparation in progress.
    Starting,
    /// Runner invoked.
    Running,
    /// Runner reported success.
    Finished,
    /// Runner reported failure.
    Failed,
}

impl ExecutionStatus {
    fn rank(self) -> u8 {
        match self {
            ExecutionStatus::Waiting => 0,
            ExecutionStatus::Starting => 1,
            ExecutionStatus::Running => 2,
            ExecutionStatus::Finished | ExecutionStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Finished | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Waiting => write!(f, "Waiting"),
            ExecutionStatus::Starting => write!(f, "Starting"),
            ExecutionStatus::Running => write!(f, "Running"),
            ExecutionStatus::Finished => write!(f, "Finished"),
            ExecutionStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One invocation of a job, manual or scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_id: String,
    pub user: Option<String>,
    pub comment: Option<String>,
    /// Overrides the job's limit.
    pub limit: Option<String>,
    /// Overlaid on the job's environment.
    pub environment_vars: Option<String>,
    pub status: ExecutionStatus,
    /// Set once the result has been parsed.
    pub result: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl JobExecution {
    /// Create a manual execution request for `job`.
    pub fn new(job: &Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job.id.clone(),
            user: None,
            comment: None,
            limit: None,
            environment_vars: None,
            status: ExecutionStatus::Waiting,
            result: None,
            created_at: Utc::now(),
        }
    }

    /// Execution synthesised for a scheduled run.
    pub fn scheduled(job: &Job) -> Self {
        Self::new(job).with_comment(SCHEDULED_COMMENT)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    pub fn with_environment_vars(mut self, vars: impl Into<String>) -> Self {
        self.environment_vars = Some(vars.into());
        self
    }

    /// Move to `to`, refusing backwards moves and anything after a terminal status.
    pub fn advance(&mut self, to: ExecutionStatus) -> Result<(), SchedulerError> {
        if self.status.is_terminal() || to.rank() <= self.status.rank() {
            return Err(SchedulerError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Aggregate outcome of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionResult {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub time_start: DateTime<Utc>,
    pub time_fini: DateTime<Utc>,
    pub failed: bool,
    pub hosts: Vec<JobExecutionResultHost>,
}

/// Per-host task counts within a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionResultHost {
    pub hostname: String,
    pub unreachable: bool,
    pub tasks_skipped: u32,
    pub tasks_ok: u32,
    pub tasks_failed: u32,
    pub tasks_ignored: u32,
    pub tasks_rescued: u32,
    pub tasks_changed: u32,
}

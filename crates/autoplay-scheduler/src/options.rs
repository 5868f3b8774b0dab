//! Runner invocation options.
//!
//! [`OptionsBuilder::prepare`] turns a [`Job`] plus a [`JobExecution`] into the
//! descriptor handed to the playbook runner, validates the referenced files and
//! allocates the run directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use autoplay_config::Config;

use crate::env_vars::{merge_env_vars, EnvVars};
use crate::error::SchedulerError;
use crate::model::{ExecutionStatus, Job, JobExecution};
use crate::run_dir::{allocate_path, RunDirectory};
use crate::store::ExecutionStore;

/// Sub-directory of the run directory used for directory isolation.
pub const ISOLATION_BASE_DIR: &str = "play_base";

/// How the runner drives the playbook process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerMode {
    #[default]
    Pexpect,
    Subprocess,
}

/// Path lists for process isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIsolation {
    pub hide_paths: Vec<String>,
    pub show_paths: Vec<String>,
    pub ro_paths: Vec<String>,
}

/// Settings shared by every run, taken from configuration and environment toggles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Base path for run directories.
    pub run_path: PathBuf,
    /// Project root holding playbooks and inventories.
    pub project_dir: PathBuf,
    pub timeout: Option<Duration>,
    pub isolate_dir: bool,
    pub process_isolation: Option<ProcessIsolation>,
}

impl RunSettings {
    pub fn new(run_path: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_path: run_path.into(),
            project_dir: project_dir.into(),
            timeout: None,
            isolate_dir: false,
            process_isolation: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let process_isolation = config.run.isolate_process.then(|| ProcessIsolation {
            hide_paths: config.run.isolate_process_path_hide.clone(),
            show_paths: config.run.isolate_process_path_show.clone(),
            ro_paths: config.run.isolate_process_path_ro.clone(),
        });

        Self {
            run_path: config.paths.run.clone(),
            project_dir: config.paths.play.clone(),
            timeout: config.run.timeout_secs.map(Duration::from_secs),
            isolate_dir: config.run.isolate_dir,
            process_isolation,
        }
    }
}

/// Descriptor handed to the playbook runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub runner_mode: RunnerMode,
    /// The run directory.
    pub private_data_dir: PathBuf,
    pub project_dir: PathBuf,
    pub quiet: bool,
    pub limit: Option<String>,
    pub env_vars: EnvVars,
    /// Playbook paths relative to `project_dir`.
    pub playbooks: Vec<String>,
    /// Inventory paths relative to `project_dir`.
    pub inventories: Vec<String>,
    pub timeout: Option<Duration>,
    pub directory_isolation_base_path: Option<PathBuf>,
    pub process_isolation: Option<ProcessIsolation>,
}

/// Options together with the directory they own. Dropping it removes the directory.
#[derive(Debug)]
pub struct PreparedRun {
    pub options: RunOptions,
    pub run_dir: RunDirectory,
}

/// Builds runner options for a job execution.
#[derive(Debug, Clone)]
pub struct OptionsBuilder {
    settings: RunSettings,
}

impl OptionsBuilder {
    pub fn new(settings: RunSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Build the options for a run in `run_path` without touching the filesystem.
    pub fn build_options(
        &self,
        job: &Job,
        execution: &JobExecution,
        run_path: PathBuf,
    ) -> Result<RunOptions, SchedulerError> {
        let env_vars = merge_env_vars(
            job.environment_vars.as_deref(),
            execution.environment_vars.as_deref(),
        )?;

        let limit = execution.limit.clone().or_else(|| job.limit.clone());

        let directory_isolation_base_path = self
            .settings
            .isolate_dir
            .then(|| run_path.join(ISOLATION_BASE_DIR));

        Ok(RunOptions {
            runner_mode: RunnerMode::default(),
            private_data_dir: run_path,
            project_dir: self.settings.project_dir.clone(),
            quiet: true,
            limit,
            env_vars,
            playbooks: job.playbooks().into_iter().map(String::from).collect(),
            inventories: job.inventories().into_iter().map(String::from).collect(),
            timeout: self.settings.timeout,
            directory_isolation_base_path,
            process_isolation: self.settings.process_isolation.clone(),
        })
    }

    /// Prepare a run: mark the execution `Starting`, build and validate the
    /// options, create the run directory and mark the execution `Running`.
    ///
    /// On a configuration error the execution stays `Starting` and no
    /// directory is left behind.
    pub async fn prepare(
        &self,
        job: &Job,
        execution: &mut JobExecution,
        store: &dyn ExecutionStore,
    ) -> Result<PreparedRun, SchedulerError> {
        execution.advance(ExecutionStatus::Starting)?;
        store.save_execution(execution).await?;

        let run_path = allocate_path(&self.settings.run_path, Utc::now());
        let options = self.build_options(job, execution, run_path)?;
        validate_files(&options)?;

        let run_dir = RunDirectory::create(&options.private_data_dir)?;
        debug!(
            "Prepared run of job '{}' in {:?}",
            job.name, options.private_data_dir
        );

        execution.advance(ExecutionStatus::Running)?;
        store.save_execution(execution).await?;

        Ok(PreparedRun { options, run_dir })
    }
}

fn validate_files(options: &RunOptions) -> Result<(), SchedulerError> {
    if options.playbooks.is_empty() {
        return Err(SchedulerError::Config("No playbook configured".to_string()));
    }
    if options.inventories.is_empty() {
        return Err(SchedulerError::Config("No inventory configured".to_string()));
    }

    for playbook in &options.playbooks {
        let path = resolve(&options.project_dir, playbook);
        if !path.is_file() {
            return Err(SchedulerError::PlaybookNotFound(path));
        }
    }

    for inventory in &options.inventories {
        let path = resolve(&options.project_dir, inventory);
        if !path.exists() {
            return Err(SchedulerError::InventoryNotFound(path));
        }
    }

    Ok(())
}

fn resolve(project_dir: &Path, relative: &str) -> PathBuf {
    project_dir.join(relative)
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;

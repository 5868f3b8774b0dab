//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl Config {
    /// Jobs that should be scheduled.
    pub fn enabled_jobs(&self) -> impl Iterator<Item = &JobConfig> {
        self.jobs.iter().filter(|j| j.enabled)
    }

    /// Find a job by id.
    pub fn job(&self, id: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base path below which per-run directories are allocated.
    #[serde(default = "default_run_path")]
    pub run: PathBuf,

    /// Project root holding playbooks and inventories.
    #[serde(default = "default_play_path")]
    pub play: PathBuf,

    /// Location of the file-based execution store.
    #[serde(default = "default_storage_path")]
    pub storage: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            run: default_run_path(),
            play: default_play_path(),
            storage: default_storage_path(),
        }
    }
}

fn default_run_path() -> PathBuf {
    std::env::temp_dir().join("autoplay")
}

fn default_play_path() -> PathBuf {
    PathBuf::from("play")
}

fn default_storage_path() -> PathBuf {
    autoplay_home().join("data")
}

/// The `~/.autoplay` directory (falls back to a relative path without a home).
pub fn autoplay_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".autoplay"))
        .unwrap_or_else(|| PathBuf::from(".autoplay"))
}

/// Settings handed to the playbook runner for every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Per-run timeout, enforced by the runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Run from a copy of the project below the run directory.
    #[serde(default)]
    pub isolate_dir: bool,

    /// Run inside a process sandbox.
    #[serde(default)]
    pub isolate_process: bool,

    #[serde(default)]
    pub isolate_process_path_hide: Vec<String>,

    #[serde(default)]
    pub isolate_process_path_show: Vec<String>,

    #[serde(default)]
    pub isolate_process_path_ro: Vec<String>,

    /// Playbook command spawned by the process runner.
    #[serde(default = "default_runner_command")]
    pub runner_command: String,

    /// Sandbox executable used for process isolation.
    #[serde(default = "default_isolation_executable")]
    pub isolation_executable: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            isolate_dir: false,
            isolate_process: false,
            isolate_process_path_hide: Vec::new(),
            isolate_process_path_show: Vec::new(),
            isolate_process_path_ro: Vec::new(),
            runner_command: default_runner_command(),
            isolation_executable: default_isolation_executable(),
        }
    }
}

fn default_runner_command() -> String {
    "ansible-playbook".to_string()
}

fn default_isolation_executable() -> String {
    "bwrap".to_string()
}

/// Worker timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Backoff after a failed cycle (seconds).
    #[serde(default = "default_fail_sleep")]
    pub fail_sleep_secs: u64,

    /// Bounded wait when joining a stopped worker (seconds).
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fail_sleep_secs: default_fail_sleep(),
            join_timeout_secs: default_join_timeout(),
        }
    }
}

fn default_fail_sleep() -> u64 {
    5
}

fn default_join_timeout() -> u64 {
    3
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rotated log files. Console only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Emit JSON lines on the console.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A scheduled playbook job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: String,

    pub name: String,

    /// Five-field cron expression.
    pub schedule: String,

    /// Comma-separated playbook paths, relative to the project root.
    pub playbook: String,

    /// Comma-separated inventory paths, relative to the project root.
    pub inventory: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,

    /// `key=value,key=value` environment for every run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_vars: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.fail_sleep_secs, 5);
        assert_eq!(config.scheduler.join_timeout_secs, 3);
        assert_eq!(config.run.runner_command, "ansible-playbook");
        assert!(config.run.timeout_secs.is_none());
        assert!(!config.run.isolate_dir);
        assert!(config.paths.run.ends_with("autoplay"));
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_job_defaults_to_enabled() {
        let job: JobConfig = toml::from_str(
            r#"
            id = "1"
            name = "deploy"
            schedule = "* * * * *"
            playbook = "site.yml"
            inventory = "hosts"
            "#,
        )
        .unwrap();
        assert!(job.enabled);
        assert!(job.limit.is_none());
    }

    #[test]
    fn test_enabled_jobs_and_lookup() {
        let job = |id: &str, enabled: bool| JobConfig {
            id: id.to_string(),
            name: format!("job {}", id),
            schedule: "* * * * *".to_string(),
            playbook: "site.yml".to_string(),
            inventory: "hosts".to_string(),
            limit: None,
            environment_vars: None,
            enabled,
        };
        let config = Config {
            jobs: vec![job("a", true), job("b", false)],
            ..Default::default()
        };

        let enabled: Vec<_> = config.enabled_jobs().map(|j| j.id.as_str()).collect();
        assert_eq!(enabled, vec!["a"]);
        assert_eq!(config.job("b").map(|j| j.name.as_str()), Some("job b"));
        assert!(config.job("c").is_none());
    }
}

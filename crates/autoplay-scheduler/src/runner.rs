//! Playbook runner boundary.
//!
//! The scheduler only sees [`PlaybookRunner::execute`]: options in, an
//! errored flag plus per-host statistics out. [`ProcessRunner`] implements it
//! by spawning `ansible-playbook` and reading its `PLAY RECAP`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use autoplay_config::RunConfig;

use crate::error::SchedulerError;
use crate::options::RunOptions;

/// Host name to count, per statistic category.
pub type HostCounts = BTreeMap<String, u32>;

/// Per-host statistics reported by the runner.
///
/// A host appears in a category only when its count is non-zero; every
/// reported host appears in `processed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerStats {
    pub processed: HostCounts,
    pub unreachable: HostCounts,
    pub skipped: HostCounts,
    pub ok: HostCounts,
    pub failures: HostCounts,
    pub ignored: HostCounts,
    pub rescued: HostCounts,
    pub changed: HostCounts,
}

impl RunnerStats {
    /// Count for `host` in `category`, 0 when absent.
    pub fn count(category: &HostCounts, host: &str) -> u32 {
        category.get(host).copied().unwrap_or(0)
    }
}

/// What the runner reports once a run completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOutcome {
    pub errored: bool,
    pub stats: RunnerStats,
}

impl RunnerOutcome {
    /// Outcome of a run that produced no statistics at all.
    pub fn errored_without_stats() -> Self {
        Self {
            errored: true,
            stats: RunnerStats::default(),
        }
    }
}

/// Executes a prepared run. Blocks (asynchronously) until the run completes.
#[async_trait]
pub trait PlaybookRunner: Send + Sync {
    async fn execute(&self, options: &RunOptions) -> Result<RunnerOutcome, SchedulerError>;
}

/// Runs playbooks as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    command: String,
    isolation_executable: String,
}

impl ProcessRunner {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            command: config.runner_command.clone(),
            isolation_executable: config.isolation_executable.clone(),
        }
    }

    /// Override the playbook command.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Program and arguments for a run from `work_dir`.
    pub fn command_line(&self, options: &RunOptions, work_dir: &Path) -> (String, Vec<String>) {
        let mut args = Vec::new();
        for inventory in &options.inventories {
            args.push("-i".to_string());
            args.push(inventory.clone());
        }
        if let Some(limit) = &options.limit {
            args.push("--limit".to_string());
            args.push(limit.clone());
        }
        args.extend(options.playbooks.iter().cloned());

        let Some(isolation) = &options.process_isolation else {
            return (self.command.clone(), args);
        };

        let mut wrapped: Vec<String> = ["--die-with-parent", "--dev-bind", "/", "/"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for path in &isolation.hide_paths {
            wrapped.extend(["--tmpfs".to_string(), path.clone()]);
        }
        for path in &isolation.ro_paths {
            wrapped.extend(["--ro-bind".to_string(), path.clone(), path.clone()]);
        }
        for path in &isolation.show_paths {
            wrapped.extend(["--bind".to_string(), path.clone(), path.clone()]);
        }
        let run_dir = options.private_data_dir.to_string_lossy().to_string();
        wrapped.extend(["--bind".to_string(), run_dir.clone(), run_dir]);
        wrapped.extend([
            "--chdir".to_string(),
            work_dir.to_string_lossy().to_string(),
            "--".to_string(),
            self.command.clone(),
        ]);
        wrapped.extend(args);

        (self.isolation_executable.clone(), wrapped)
    }

    async fn work_dir(&self, options: &RunOptions) -> Result<PathBuf, SchedulerError> {
        let Some(base) = options.directory_isolation_base_path.clone() else {
            return Ok(options.project_dir.clone());
        };

        let source = options.project_dir.clone();
        let target = base.clone();
        tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|e| SchedulerError::Runner(format!("Project copy task failed: {}", e)))??;

        debug!("Copied project {:?} to {:?}", options.project_dir, base);
        Ok(base)
    }
}

#[async_trait]
impl PlaybookRunner for ProcessRunner {
    async fn execute(&self, options: &RunOptions) -> Result<RunnerOutcome, SchedulerError> {
        let work_dir = self.work_dir(options).await?;
        let (program, args) = self.command_line(options, &work_dir);

        let artifacts = options.private_data_dir.join("artifacts");
        tokio::fs::create_dir_all(&artifacts).await?;
        let stdout_path = artifacts.join("stdout");
        let log = std::fs::File::create(&stdout_path)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&work_dir)
            .envs(&options.env_vars)
            .env("ANSIBLE_NOCOLOR", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);

        info!("Running {} {}", program, args.join(" "));
        let mut child = cmd
            .spawn()
            .map_err(|e| SchedulerError::Runner(format!("Failed to spawn '{}': {}", program, e)))?;

        let status = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("Run in {:?} timed out after {:?}", options.private_data_dir, limit);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill timed out runner: {}", e);
                    }
                    return Ok(RunnerOutcome::errored_without_stats());
                }
            },
            None => child.wait().await?,
        };

        let output = tokio::fs::read(&stdout_path).await?;
        let stdout = String::from_utf8_lossy(&output);
        let stats = parse_recap(&stdout)?;
        debug!(
            "Runner exited with {} ({} hosts processed)",
            status,
            stats.processed.len()
        );

        Ok(RunnerOutcome {
            errored: !status.success(),
            stats,
        })
    }
}

/// Parse the `PLAY RECAP` section of playbook output.
pub fn parse_recap(output: &str) -> Result<RunnerStats, SchedulerError> {
    let line_re = regex::Regex::new(r"^\s*(\S+)\s*:\s*(.*)$")
        .map_err(|e| SchedulerError::Runner(e.to_string()))?;
    let pair_re =
        regex::Regex::new(r"(\w+)=(\d+)").map_err(|e| SchedulerError::Runner(e.to_string()))?;

    let mut stats = RunnerStats::default();
    let Some(start) = output.find("PLAY RECAP") else {
        return Ok(stats);
    };

    for line in output[start..].lines().skip(1) {
        let Some(caps) = line_re.captures(line) else {
            continue;
        };
        let host = caps[1].to_string();
        let mut seen = false;

        for pair in pair_re.captures_iter(&caps[2]) {
            let count: u32 = pair[2].parse().unwrap_or(0);
            let category = match &pair[1] {
                "ok" => &mut stats.ok,
                "changed" => &mut stats.changed,
                "unreachable" => &mut stats.unreachable,
                "failed" => &mut stats.failures,
                "skipped" => &mut stats.skipped,
                "rescued" => &mut stats.rescued,
                "ignored" => &mut stats.ignored,
                _ => continue,
            };
            seen = true;
            if count > 0 {
                category.insert(host.clone(), count);
            }
        }

        if seen {
            stats.processed.insert(host, 1);
        }
    }

    Ok(stats)
}

fn copy_tree(source: &Path, target: &Path) -> Result<(), SchedulerError> {
    std::fs::create_dir_all(target)?;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !e.path().starts_with(target));

    for entry in walker {
        let entry = entry.map_err(|e| SchedulerError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| SchedulerError::Runner(e.to_string()))?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else if entry.path().is_file() {
            std::fs::copy(entry.path(), &destination)?;
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;

//! Foreground scheduler with signal handling.

use std::collections::HashMap;
use std::path::Path;

use tracing::{error, info, warn};

use autoplay_config::Config;
use autoplay_scheduler::{Job, JobManager};

use crate::adapters::{build_manager, build_store, load_config, validate_config};

/// Jobs to add, replace and stop to move from one job set to another.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReloadPlan {
    pub add: Vec<Job>,
    pub replace: Vec<Job>,
    pub remove: Vec<String>,
}

impl ReloadPlan {
    pub(crate) fn between(current: &[Job], desired: &[Job]) -> Self {
        let current: HashMap<&str, &Job> = current.iter().map(|j| (j.id.as_str(), j)).collect();
        let mut plan = Self::default();

        for job in desired {
            match current.get(job.id.as_str()) {
                None => plan.add.push(job.clone()),
                Some(existing) if *existing != job => plan.replace.push(job.clone()),
                Some(_) => {}
            }
        }

        let mut remove: Vec<String> = current
            .keys()
            .filter(|id| !desired.iter().any(|j| j.id == **id))
            .map(|id| id.to_string())
            .collect();
        remove.sort();
        plan.remove = remove;
        plan
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.add.is_empty() && self.replace.is_empty() && self.remove.is_empty()
    }
}

fn enabled_jobs(config: &Config) -> Vec<Job> {
    config.enabled_jobs().map(Job::from).collect()
}

/// Run every enabled job until SIGINT or SIGTERM. SIGHUP reloads the jobs.
pub(crate) async fn run_scheduler(
    config_path: &Path,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Autoplay v{}", env!("CARGO_PKG_VERSION"));
    info!("Project root: {}", config.paths.play.display());
    info!("Run directories: {}", config.paths.run.display());

    let store = build_store(&config).await?;
    let manager = build_manager(&config, store);

    for job in enabled_jobs(&config) {
        manager.add(job, None, false).await?;
    }
    manager.start().await;
    for line in manager.list_summary().await {
        info!("{}", line);
    }

    wait_for_signals(config_path, &manager).await?;

    info!("Shutting down...");
    manager.stop().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signals(
    config_path: &Path,
    manager: &JobManager,
) -> Result<(), Box<dyn std::error::Error>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
                return Ok(());
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading {}", config_path.display());
                if let Err(e) = reload(config_path, manager).await {
                    error!("Reload failed, keeping current jobs: {}", e);
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(
    _config_path: &Path,
    _manager: &JobManager,
) -> Result<(), Box<dyn std::error::Error>> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    Ok(())
}

async fn reload(config_path: &Path, manager: &JobManager) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    validate_config(&config)?;

    let plan = ReloadPlan::between(&manager.list().await, &enabled_jobs(&config));
    if plan.is_empty() {
        info!("Jobs unchanged");
        return Ok(());
    }

    for id in &plan.remove {
        manager.stop_job(id).await;
    }
    for job in plan.replace {
        let id = job.id.clone();
        if let Err(e) = manager.replace_job(job).await {
            warn!("Could not replace job {}: {}", id, e);
        }
    }
    for job in plan.add {
        let id = job.id.clone();
        match manager.add(job, None, false).await {
            Ok(_) => {
                manager.start_job(&id).await;
            }
            Err(e) => warn!("Could not add job {}: {}", id, e),
        }
    }

    info!(
        "Reload complete, {} job(s) scheduled",
        manager.len().await
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, schedule: &str) -> Job {
        Job::new(id, format!("job-{}", id), schedule, "site.yml", "hosts")
    }

    #[test]
    fn test_plan_unchanged() {
        let jobs = vec![job("1", "* * * * *")];
        assert!(ReloadPlan::between(&jobs, &jobs).is_empty());
    }

    #[test]
    fn test_plan_changes() {
        let current = vec![job("1", "* * * * *"), job("2", "0 3 * * *"), job("3", "0 4 * * *")];
        let desired = vec![
            job("1", "* * * * *"),
            job("2", "0 5 * * *"),
            job("4", "0 6 * * *"),
        ];

        let plan = ReloadPlan::between(&current, &desired);
        assert_eq!(plan.add, vec![job("4", "0 6 * * *")]);
        assert_eq!(plan.replace, vec![job("2", "0 5 * * *")]);
        assert_eq!(plan.remove, vec!["3".to_string()]);
    }

    #[test]
    fn test_plan_detects_override_changes() {
        let current = vec![job("1", "* * * * *")];
        let desired = vec![job("1", "* * * * *").with_environment_vars("A=1")];

        let plan = ReloadPlan::between(&current, &desired);
        assert_eq!(plan.replace.len(), 1);
        assert!(plan.add.is_empty());
    }

    #[test]
    fn test_enabled_jobs_only() {
        let config = autoplay_config::ConfigLoader::load_str(
            r#"
[[jobs]]
id = "1"
name = "on"
schedule = "* * * * *"
playbook = "site.yml"
inventory = "hosts"

[[jobs]]
id = "2"
name = "off"
schedule = "* * * * *"
playbook = "site.yml"
inventory = "hosts"
enabled = false
"#,
        )
        .unwrap();

        let jobs = enabled_jobs(&config);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "1");
    }
}

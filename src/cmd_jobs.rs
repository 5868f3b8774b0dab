//! One-off subcommand handlers: once, list, check.

use chrono::Utc;

use autoplay_config::{Config, ConfigValidator};
use autoplay_scheduler::schedule::next_execution_string;
use autoplay_scheduler::{ExecutionStatus, ExecutionStore, Job, JobExecution};

use crate::adapters::{build_manager, build_store};

/// Options for a manual run.
pub(crate) struct OnceArgs {
    pub job_id: String,
    pub limit: Option<String>,
    pub env: Option<String>,
    pub comment: Option<String>,
    pub user: Option<String>,
}

/// Run one job through a one-shot worker and report its final status.
pub(crate) async fn run_once(
    config: &Config,
    args: OnceArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let job_config = config
        .job(&args.job_id)
        .ok_or_else(|| format!("Job '{}' not found", args.job_id))?;
    let job = Job::from(job_config);

    let execution = build_execution(&job, &args);
    let execution_id = execution.id;

    let store = build_store(config).await?;
    let manager = build_manager(config, store.clone());
    let worker = manager.add(job, Some(execution), true).await?;
    manager.start_job(&args.job_id).await;
    worker.stopped().await;

    let execution = store
        .load_execution(execution_id)
        .await?
        .ok_or("Execution record missing")?;
    println!("Execution {}: {}", execution.id, execution.status);

    if let Some(result_id) = execution.result {
        if let Some(result) = store.load_result(result_id).await? {
            for host in &result.hosts {
                println!(
                    "  {:<24} ok={} changed={} failed={} skipped={} rescued={} ignored={}{}",
                    host.hostname,
                    host.tasks_ok,
                    host.tasks_changed,
                    host.tasks_failed,
                    host.tasks_skipped,
                    host.tasks_rescued,
                    host.tasks_ignored,
                    if host.unreachable { " unreachable" } else { "" }
                );
            }
        }
    }

    match execution.status {
        ExecutionStatus::Finished => Ok(()),
        status => Err(format!("Job '{}' ended {}", args.job_id, status).into()),
    }
}

fn build_execution(job: &Job, args: &OnceArgs) -> JobExecution {
    let mut execution = JobExecution::new(job);
    execution.user = args.user.clone();
    execution.comment = args.comment.clone();
    execution.limit = args.limit.clone();
    execution.environment_vars = args.env.clone();
    execution
}

/// One line per enabled job with its next run.
pub(crate) fn list_jobs(config: &Config) -> Vec<String> {
    let now = Utc::now();
    config
        .enabled_jobs()
        .map(|job| {
            let next = next_execution_string(&job.schedule, now)
                .unwrap_or_else(|e| format!("invalid schedule ({})", e));
            format!("[{}] {} next run at {}", job.id, job.name, next)
        })
        .collect()
}

/// Validate the configuration and print every finding.
pub(crate) fn check_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(config)?;

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if result.is_valid() {
        println!("Configuration OK ({} job(s))", config.jobs.len());
        Ok(())
    } else {
        Err(format!("{} configuration error(s)", result.errors.len()).into())
    }
}

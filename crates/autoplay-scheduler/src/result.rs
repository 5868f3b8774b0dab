//! Result parsing.
//!
//! Converts a [`RunnerOutcome`] into a [`JobExecutionResult`] with one host row
//! per processed host and moves the execution to its terminal status.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::model::{ExecutionStatus, JobExecution, JobExecutionResult, JobExecutionResultHost};
use crate::runner::{RunnerOutcome, RunnerStats};
use crate::store::ExecutionStore;

/// Record the outcome of a completed run.
///
/// Saves the result, links it to the execution and sets the execution to
/// `Failed` or `Finished`. This is the only place an execution becomes terminal.
pub async fn parse_run_result(
    execution: &mut JobExecution,
    time_start: DateTime<Utc>,
    outcome: &RunnerOutcome,
    store: &dyn ExecutionStore,
) -> Result<JobExecutionResult, SchedulerError> {
    let result = JobExecutionResult {
        id: Uuid::new_v4(),
        execution_id: execution.id,
        time_start,
        time_fini: Utc::now(),
        failed: outcome.errored,
        hosts: host_rows(&outcome.stats),
    };
    let status = if result.failed {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Finished
    };
    execution.advance(status)?;
    execution.result = Some(result.id);

    store.save_result(&result).await?;
    store.save_execution(execution).await?;

    debug!(
        "Execution {} {} with {} host(s)",
        execution.id,
        execution.status,
        result.hosts.len()
    );
    Ok(result)
}

fn host_rows(stats: &RunnerStats) -> Vec<JobExecutionResultHost> {
    stats
        .processed
        .keys()
        .map(|host| JobExecutionResultHost {
            hostname: host.clone(),
            unreachable: stats.unreachable.contains_key(host),
            tasks_skipped: RunnerStats::count(&stats.skipped, host),
            tasks_ok: RunnerStats::count(&stats.ok, host),
            tasks_failed: RunnerStats::count(&stats.failures, host),
            tasks_ignored: RunnerStats::count(&stats.ignored, host),
            tasks_rescued: RunnerStats::count(&stats.rescued, host),
            tasks_changed: RunnerStats::count(&stats.changed, host),
        })
        .collect()
}

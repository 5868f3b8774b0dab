//! Wiring between configuration and the scheduler.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use autoplay_config::{Config, ConfigLoader, ConfigValidator};
use autoplay_scheduler::{
    ExecutionPipeline, ExecutionStore, FileExecutionStore, JobManager, ProcessRunner,
    RunSettings, WorkerConfig,
};

/// Load the configuration file with environment overrides applied.
pub(crate) fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(ConfigLoader::load(path)?)
}

/// Validate the configuration, logging warnings. Any error aborts.
pub(crate) fn validate_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(config)?;

    for warning in &result.warnings {
        warn!("{}: {}", warning.path, warning.message);
    }
    if !result.is_valid() {
        let errors: Vec<String> = result
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        return Err(format!("Invalid configuration: {}", errors.join("; ")).into());
    }

    Ok(())
}

/// File-backed execution store under `paths.storage`.
pub(crate) async fn build_store(
    config: &Config,
) -> Result<Arc<dyn ExecutionStore>, Box<dyn std::error::Error>> {
    let store = FileExecutionStore::new(&config.paths.storage).await?;
    info!("Execution records stored in {}", config.paths.storage.display());
    Ok(Arc::new(store))
}

/// Manager running playbooks through the configured runner command.
pub(crate) fn build_manager(config: &Config, store: Arc<dyn ExecutionStore>) -> JobManager {
    let pipeline = ExecutionPipeline::new(
        RunSettings::from_config(config),
        Arc::new(ProcessRunner::new(&config.run)),
        store,
    );
    JobManager::new(
        Arc::new(pipeline),
        WorkerConfig::from_config(&config.scheduler),
    )
}

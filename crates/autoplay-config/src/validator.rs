//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::{Config, JobConfig};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_paths(config, &mut result);
        Self::validate_run(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_jobs(config, &mut result);

        Ok(result)
    }

    fn validate_paths(config: &Config, result: &mut ValidationResult) {
        if config.paths.run.as_os_str().is_empty() {
            result.add_error(ValidationError::new("paths.run", "Run path cannot be empty"));
        }

        if config.paths.play.as_os_str().is_empty() {
            result.add_error(ValidationError::new("paths.play", "Play path cannot be empty"));
        } else if !config.paths.play.exists() {
            result.add_warning(ValidationWarning::new(
                "paths.play",
                format!("Project root does not exist: {:?}", config.paths.play),
            ));
        }
    }

    fn validate_run(config: &Config, result: &mut ValidationResult) {
        if config.run.timeout_secs == Some(0) {
            result.add_error(ValidationError::new(
                "run.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        if config.run.runner_command.trim().is_empty() {
            result.add_error(ValidationError::new(
                "run.runner_command",
                "Runner command cannot be empty",
            ));
        }

        if config.run.isolate_process && config.run.isolation_executable.trim().is_empty() {
            result.add_error(ValidationError::new(
                "run.isolation_executable",
                "Process isolation is enabled but no isolation executable is set",
            ));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        if config.scheduler.join_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "scheduler.join_timeout_secs",
                "join_timeout_secs must be greater than 0",
            ));
        }

        if config.scheduler.fail_sleep_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "scheduler.fail_sleep_secs",
                "fail_sleep_secs is 0, failing jobs will retry in a tight loop",
            ));
        }
    }

    fn validate_jobs(config: &Config, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (index, job) in config.jobs.iter().enumerate() {
            let path = format!("jobs[{}]", index);

            if job.id.is_empty() {
                result.add_error(ValidationError::new(format!("{}.id", path), "Job id cannot be empty"));
            } else if !seen.insert(job.id.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.id", path),
                    format!("Duplicate job id '{}'", job.id),
                ));
            }

            Self::validate_job(job, &path, result);
        }
    }

    fn validate_job(job: &JobConfig, path: &str, result: &mut ValidationResult) {
        let fields = job.schedule.split_whitespace().count();
        if fields != 5 {
            result.add_error(ValidationError::new(
                format!("{}.schedule", path),
                format!(
                    "Schedule '{}' must have 5 fields (minute hour day month weekday), found {}",
                    job.schedule, fields
                ),
            ));
        }

        if job.playbook.trim().is_empty() {
            result.add_error(ValidationError::new(
                format!("{}.playbook", path),
                "At least one playbook is required",
            ));
        }

        if job.inventory.trim().is_empty() {
            result.add_error(ValidationError::new(
                format!("{}.inventory", path),
                "At least one inventory is required",
            ));
        }

        if !job.enabled {
            result.add_warning(ValidationWarning::new(
                format!("{}.enabled", path),
                format!("Job '{}' is disabled and will not be scheduled", job.name),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

//! Scheduler errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::ExecutionStatus;

/// Which record an environment-variable string came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSource {
    Job,
    Execution,
}

impl std::fmt::Display for VarSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarSource::Job => write!(f, "Job"),
            VarSource::Execution => write!(f, "Execution"),
        }
    }
}

/// Errors raised while scheduling or executing jobs.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Environment-variable string is not a list of `key=value` pairs.
    #[error(
        "Environmental variables of {origin} are not in a valid format \
         (comma-separated key-value pairs). Example: 'key1=val1,key2=val2'"
    )]
    InvalidEnvVars { origin: VarSource },

    /// Configured playbook does not exist below the project root.
    #[error("Configured playbook not found: '{}'", .0.display())]
    PlaybookNotFound(PathBuf),

    /// Configured inventory does not exist below the project root.
    #[error("Configured inventory not found: '{}'", .0.display())]
    InventoryNotFound(PathBuf),

    /// Cron expression could not be parsed or never fires.
    #[error("Invalid schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    /// Other configuration problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// OS-level failure (directory allocation, removal, existence checks).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Execution status may only move forward.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// Persisting a record failed.
    #[error("Store error: {0}")]
    Store(String),

    /// The playbook runner failed to run at all.
    #[error("Runner error: {0}")]
    Runner(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A worker for this job is already registered.
    #[error("Job already scheduled: {0}")]
    AlreadyScheduled(String),
}

/// Failure classes distinguished by the worker's logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad playbook/inventory path, malformed env vars, bad schedule.
    Configuration,
    /// OS-level failure.
    Environment,
    /// Anything else.
    Unexpected,
}

impl SchedulerError {
    /// Classify the error for logging and retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            SchedulerError::InvalidEnvVars { .. }
            | SchedulerError::PlaybookNotFound(_)
            | SchedulerError::InventoryNotFound(_)
            | SchedulerError::InvalidSchedule { .. }
            | SchedulerError::Config(_) => ErrorClass::Configuration,
            SchedulerError::Io(_) => ErrorClass::Environment,
            _ => ErrorClass::Unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_env_vars_names_source() {
        let err = SchedulerError::InvalidEnvVars {
            origin: VarSource::Execution,
        };
        let msg = err.to_string();
        assert!(msg.contains("Execution"));
        assert!(msg.contains("key1=val1"));

        let err = SchedulerError::InvalidEnvVars {
            origin: VarSource::Job,
        };
        assert!(err.to_string().contains("of Job"));
    }

    #[test]
    fn test_not_found_messages() {
        let err = SchedulerError::PlaybookNotFound(PathBuf::from("/srv/play/site.yml"));
        assert_eq!(
            err.to_string(),
            "Configured playbook not found: '/srv/play/site.yml'"
        );

        let err = SchedulerError::InventoryNotFound(PathBuf::from("/srv/play/hosts"));
        assert!(err.to_string().contains("inventory not found"));
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            SchedulerError::PlaybookNotFound(PathBuf::from("x")).class(),
            ErrorClass::Configuration
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(SchedulerError::from(io).class(), ErrorClass::Environment);
        assert_eq!(
            SchedulerError::Runner("boom".to_string()).class(),
            ErrorClass::Unexpected
        );
        assert_eq!(
            SchedulerError::Config("x".to_string()).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            SchedulerError::Store("x".to_string()).class(),
            ErrorClass::Unexpected
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = SchedulerError::InvalidTransition {
            from: ExecutionStatus::Finished,
            to: ExecutionStatus::Running,
        };
        let msg = err.to_string();
        assert!(msg.contains("Finished"));
        assert!(msg.contains("Running"));
    }
}

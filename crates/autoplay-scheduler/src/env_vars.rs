//! `key=value,key=value` environment strings.

use std::collections::BTreeMap;

use crate::error::{SchedulerError, VarSource};

/// Environment handed to the runner.
pub type EnvVars = BTreeMap<String, String>;

/// Decode a comma-separated list of `key=value` pairs.
///
/// Every token must contain exactly one `=` and a non-empty key. A blank
/// string decodes to an empty mapping.
pub fn decode_env_vars(csv: &str, origin: VarSource) -> Result<EnvVars, SchedulerError> {
    let mut vars = EnvVars::new();
    if csv.trim().is_empty() {
        return Ok(vars);
    }

    for pair in csv.split(',') {
        let mut parts = pair.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.trim().is_empty() => {
                vars.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => return Err(SchedulerError::InvalidEnvVars { origin }),
        }
    }

    Ok(vars)
}

/// Job variables overlaid with execution variables; the execution wins on conflict.
pub fn merge_env_vars(
    job_vars: Option<&str>,
    execution_vars: Option<&str>,
) -> Result<EnvVars, SchedulerError> {
    let mut merged = match job_vars {
        Some(csv) => decode_env_vars(csv, VarSource::Job)?,
        None => EnvVars::new(),
    };

    if let Some(csv) = execution_vars {
        merged.extend(decode_env_vars(csv, VarSource::Execution)?);
    }

    Ok(merged)
}

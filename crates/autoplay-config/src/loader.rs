//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::schema::Config;

/// Prefix shared by every environment toggle.
pub const ENV_PREFIX: &str = "AUTOPLAY_";

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file and apply `AUTOPLAY_*` toggles
    /// from the process environment.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        let mut config = Self::load_str(&content)?;
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        Self::expand_paths(&mut config);
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    fn expand_paths(config: &mut Config) {
        config.paths.run = Self::expand_path_buf(&config.paths.run);
        config.paths.play = Self::expand_path_buf(&config.paths.play);
        config.paths.storage = Self::expand_path_buf(&config.paths.storage);
        if let Some(dir) = config.logging.dir.take() {
            config.logging.dir = Some(Self::expand_path_buf(&dir));
        }
    }

    fn expand_path_buf(path: &Path) -> PathBuf {
        PathBuf::from(Self::expand_path(&path.to_string_lossy()))
    }

    /// Expand shell-style paths (e.g., `~/.autoplay`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }

    /// Apply the `AUTOPLAY_*` toggles found through `lookup` on top of `config`.
    pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(path) = get("PATH_RUN") {
            config.paths.run = PathBuf::from(Self::expand_path(&path));
        }
        if let Some(path) = get("PATH_PLAY") {
            config.paths.play = PathBuf::from(Self::expand_path(&path));
        }

        if let Some(timeout) = get("RUN_TIMEOUT") {
            let secs = timeout.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                field: format!("{}RUN_TIMEOUT", ENV_PREFIX),
                message: format!("expected a number of seconds, got '{}'", timeout),
            })?;
            config.run.timeout_secs = Some(secs);
        }
        if let Some(flag) = get("RUN_ISOLATE_DIR") {
            config.run.isolate_dir = is_truthy(&flag);
        }
        if let Some(flag) = get("RUN_ISOLATE_PROCESS") {
            config.run.isolate_process = is_truthy(&flag);
        }
        if let Some(paths) = get("RUN_ISOLATE_PROCESS_PATH_HIDE") {
            config.run.isolate_process_path_hide = split_list(&paths);
        }
        if let Some(paths) = get("RUN_ISOLATE_PROCESS_PATH_SHOW") {
            config.run.isolate_process_path_show = split_list(&paths);
        }
        if let Some(paths) = get("RUN_ISOLATE_PROCESS_PATH_RO") {
            config.run.isolate_process_path_ro = split_list(&paths);
        }

        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.scheduler.fail_sleep_secs, 5);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_expand_path() {
        let expanded = ConfigLoader::expand_path("~/.autoplay");
        assert!(!expanded.starts_with('~'));
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [paths]
            run = "/var/tmp/autoplay"
            play = "/srv/play"

            [run]
            timeout_secs = 600
            isolate_dir = true

            [scheduler]
            fail_sleep_secs = 1

            [[jobs]]
            id = "1"
            name = "Site deploy"
            schedule = "*/15 * * * *"
            playbook = "site.yml"
            inventory = "inventories/prod"
            environment_vars = "ENV=prod"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.paths.run, PathBuf::from("/var/tmp/autoplay"));
        assert_eq!(config.run.timeout_secs, Some(600));
        assert!(config.run.isolate_dir);
        assert_eq!(config.scheduler.fail_sleep_secs, 1);
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].environment_vars.as_deref(), Some("ENV=prod"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]").unwrap();
        writeln!(file, "join_timeout_secs = 9").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.scheduler.join_timeout_secs, 9);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/autoplay.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_missing_substitution_variable() {
        let result = ConfigLoader::load_str(r#"[paths]
            play = "${AUTOPLAY_TEST_SURELY_UNSET_VARIABLE}""#);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("AUTOPLAY_RUN_TIMEOUT", "120"),
            ("AUTOPLAY_RUN_ISOLATE_DIR", "yes"),
            ("AUTOPLAY_RUN_ISOLATE_PROCESS", "1"),
            ("AUTOPLAY_RUN_ISOLATE_PROCESS_PATH_HIDE", "/home, /root"),
            ("AUTOPLAY_RUN_ISOLATE_PROCESS_PATH_RO", "/etc"),
            ("AUTOPLAY_PATH_PLAY", "/srv/play"),
        ]);
        let mut config = Config::default();
        ConfigLoader::apply_env_overrides(&mut config, |k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.run.timeout_secs, Some(120));
        assert!(config.run.isolate_dir);
        assert!(config.run.isolate_process);
        assert_eq!(config.run.isolate_process_path_hide, vec!["/home", "/root"]);
        assert_eq!(config.run.isolate_process_path_ro, vec!["/etc"]);
        assert!(config.run.isolate_process_path_show.is_empty());
        assert_eq!(config.paths.play, PathBuf::from("/srv/play"));
    }

    #[test]
    fn test_env_override_false_values() {
        let vars = env(&[("AUTOPLAY_RUN_ISOLATE_DIR", "off")]);
        let mut config = Config::default();
        config.run.isolate_dir = true;
        ConfigLoader::apply_env_overrides(&mut config, |k| vars.get(k).cloned()).unwrap();
        assert!(!config.run.isolate_dir);
    }

    #[test]
    fn test_env_override_invalid_timeout() {
        let vars = env(&[("AUTOPLAY_RUN_TIMEOUT", "soon")]);
        let mut config = Config::default();
        let result = ConfigLoader::apply_env_overrides(&mut config, |k| vars.get(k).cloned());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}

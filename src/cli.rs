//! CLI definitions for Autoplay.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Autoplay CLI.
#[derive(Parser)]
#[command(name = "autoplay")]
#[command(about = "Cron-driven playbook job scheduler")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/autoplay.toml", global = true, env = "AUTOPLAY_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler in foreground (default)
    Run,

    /// Run a single job now and wait for it to finish
    Once {
        /// Job ID
        job_id: String,

        /// Target-limit override
        #[arg(long)]
        limit: Option<String>,

        /// Environment overrides (KEY=VALUE,KEY=VALUE)
        #[arg(long)]
        env: Option<String>,

        /// Comment stored with the execution
        #[arg(long)]
        comment: Option<String>,

        /// User recorded on the execution
        #[arg(long, env = "USER")]
        user: Option<String>,
    },

    /// List enabled jobs with their next run
    List,

    /// Validate the configuration file
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::try_parse_from(["autoplay"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.ends_with("autoplay.toml"));
    }

    #[test]
    fn test_once_arguments() {
        let cli = Cli::try_parse_from([
            "autoplay",
            "--config",
            "/etc/autoplay.toml",
            "once",
            "7",
            "--limit",
            "web",
            "--env",
            "A=1,B=2",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/autoplay.toml"));
        match cli.command {
            Some(Commands::Once {
                job_id, limit, env, ..
            }) => {
                assert_eq!(job_id, "7");
                assert_eq!(limit.as_deref(), Some("web"));
                assert_eq!(env.as_deref(), Some("A=1,B=2"));
            }
            _ => panic!("expected once"),
        }
    }

    #[test]
    fn test_once_requires_job_id() {
        assert!(Cli::try_parse_from(["autoplay", "once"]).is_err());
    }
}

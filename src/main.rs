//! Autoplay - cron-driven playbook job scheduler
//!
//! Main entry point for the Autoplay CLI.

mod adapters;
mod cli;
mod cmd_jobs;
mod cmd_run;

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use autoplay_config::LoggingConfig;

use crate::adapters::{load_config, validate_config};
use crate::cli::{Cli, Commands};
use crate::cmd_jobs::OnceArgs;

/// Initialize tracing with console output and, when a log directory is
/// configured, daily rotated log files.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console = if logging.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    let file = match &logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("autoplay")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if let Some(Commands::Check) = cli.command {
        return cmd_jobs::check_config(&config);
    }

    init_tracing(&config.logging)?;
    validate_config(&config)?;

    match cli.command {
        None | Some(Commands::Run) => cmd_run::run_scheduler(&cli.config, config).await,
        Some(Commands::Once {
            job_id,
            limit,
            env,
            comment,
            user,
        }) => {
            let args = OnceArgs {
                job_id,
                limit,
                env,
                comment,
                user,
            };
            cmd_jobs::run_once(&config, args).await
        }
        Some(Commands::List) => {
            for line in cmd_jobs::list_jobs(&config) {
                println!("{}", line);
            }
            Ok(())
        }
        Some(Commands::Check) => cmd_jobs::check_config(&config),
    }
}

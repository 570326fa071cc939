//! # pairwatch
//!
//! Pairing advertisement monitor.
//!
//! This binary provides:
//! - A live mode feeding simulated advertisements into the device cache and
//!   printing periodic reports
//! - A scenarios mode replaying the fixed fill and duplicate sequences
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package pairwatch
//!
//! # Scenarios only
//! PAIRWATCH_MODE=scenarios ./pairwatch
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use pairwatch::state::SharedMonitor;
use pairwatch::{logging, report, runner};
use pairwatch_core::{config_path_from_env, Config, PairwatchError, RunMode};
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = runner::failure_exit_code(&err);
            eprintln!("Error: {err:#}");
            ExitCode::from(code)
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = config_path_from_env();
    let mut config = Config::load_or_default(&config_path)
        .map_err(PairwatchError::from)
        .with_context(|| format!("Loading configuration from {}", config_path.display()))?;
    config
        .apply_env_overrides()
        .map_err(PairwatchError::from)
        .context("Applying environment overrides")?;
    config
        .validate()
        .map_err(PairwatchError::from)
        .context("Validating configuration")?;

    logging::init(&config.logging)?;

    info!(
        mode = %config.feed.mode,
        config = %config_path.display(),
        "Starting pairwatch"
    );

    match config.feed.mode {
        RunMode::Live => {
            let monitor = SharedMonitor::system();
            let duration_secs = config.feed.duration_secs;
            let shutdown = async move {
                tokio::select! {
                    () = runner::shutdown_signal() => {}
                    () = runner::run_deadline(duration_secs) => {}
                }
            };

            let summary = runner::run_live(&config, monitor.clone(), shutdown).await?;
            let text = report::render(
                config.report.format,
                &summary.final_report,
                config.report.order,
                Utc::now(),
            )?;
            println!("{text}");

            monitor.clear().await.map_err(PairwatchError::from)?;
        }
        RunMode::Scenarios => runner::run_scenarios(&config.report)?,
    }

    info!("pairwatch finished");
    Ok(())
}

//! Run modes of the pairwatch binary.
//!
//! - **Live**: an advertiser task feeds simulated advertisements into the
//!   shared monitor while a reporter task prints a report every interval.
//!   Both stop on shutdown (signal or configured duration).
//! - **Scenarios**: the fixed fill / duplicate scenarios run once each.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use pairwatch_core::{
    CacheStats, Config, DeviceReport, PairwatchError, RecordOutcome, ReportConfig, ReportOrder,
    TimeSource,
};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::feed::{AdvertisementFeed, Scenario};
use crate::report;
use crate::state::SharedMonitor;

/// What a live run left behind.
#[derive(Debug, Clone)]
pub struct LiveSummary {
    /// Cache counters at shutdown.
    pub stats: CacheStats,
    /// Final report in the configured order.
    pub final_report: Vec<DeviceReport>,
}

/// Run the simulated feed and periodic reports until `shutdown` completes.
///
/// # Errors
///
/// Returns the fatal cache error that stopped the advertiser task, or the
/// task's join error if it panicked.
pub async fn run_live<C, F>(
    config: &Config,
    monitor: SharedMonitor<C>,
    shutdown: F,
) -> anyhow::Result<LiveSummary>
where
    C: TimeSource + Send + 'static,
    F: Future<Output = ()>,
{
    let mut advertiser = spawn_advertiser(
        monitor.clone(),
        AdvertisementFeed::from_config(&config.feed),
        Duration::from_millis(config.feed.advertise_interval_ms),
    );
    let reporter = spawn_reporter(monitor.clone(), config.report.clone());

    info!(
        advertise_interval_ms = config.feed.advertise_interval_ms,
        report_interval_secs = config.report.interval_secs,
        "Live feed started"
    );

    let result: anyhow::Result<()> = tokio::select! {
        () = shutdown => {
            info!("Shutdown requested");
            Ok(())
        }
        joined = &mut advertiser => match joined {
            Ok(Ok(())) => {
                warn!("Advertisement feed ended");
                Ok(())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(err) => Err(anyhow::Error::new(err).context("Advertiser task failed")),
        },
    };

    advertiser.abort();
    reporter.abort();
    result?;

    let summary = LiveSummary {
        stats: monitor.stats().await,
        final_report: monitor.report(config.report.order).await,
    };
    info!(
        devices = summary.stats.len,
        inserts = summary.stats.inserts,
        merges = summary.stats.merges,
        evictions = summary.stats.evictions,
        "Live feed stopped"
    );
    Ok(summary)
}

fn spawn_advertiser<C>(
    monitor: SharedMonitor<C>,
    mut feed: AdvertisementFeed,
    period: Duration,
) -> JoinHandle<Result<(), PairwatchError>>
where
    C: TimeSource + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(observation) = feed.next() else {
                return Ok(());
            };
            match monitor.record(&observation).await {
                Ok(RecordOutcome::Replaced { evicted }) => {
                    debug!(device_id = observation.device_id, evicted, "Device replaced");
                }
                Ok(_) => {}
                Err(err) => {
                    let err = PairwatchError::from(err);
                    error!(
                        code = err.error_code(),
                        error = %err,
                        "Fatal cache error, stopping advertiser"
                    );
                    return Err(err);
                }
            }
        }
    })
}

fn spawn_reporter<C>(monitor: SharedMonitor<C>, config: ReportConfig) -> JoinHandle<()>
where
    C: TimeSource + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip the empty report.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let rows = monitor.report(config.order).await;
            match report::render(config.format, &rows, config.order, Utc::now()) {
                Ok(text) => println!("{text}"),
                Err(err) => warn!(error = %err, "Failed to render report"),
            }
        }
    })
}

/// Run every scenario once, printing its reports.
///
/// # Errors
///
/// Returns the first fatal cache error.
pub fn run_scenarios(config: &ReportConfig) -> Result<(), PairwatchError> {
    for scenario in Scenario::ALL {
        let outcome = scenario.run()?;
        println!(
            "======== {} ({} advertisements) ========",
            scenario.name(),
            outcome.advertisements
        );
        for (order, rows) in [
            (ReportOrder::Recency, &outcome.by_recency),
            (ReportOrder::SignalStrength, &outcome.by_signal_strength),
        ] {
            match report::render(config.format, rows, order, Utc::now()) {
                Ok(text) => println!("{text}"),
                Err(err) => warn!(error = %err, "Failed to render report"),
            }
        }
    }
    Ok(())
}

/// Log a failed run and pick the process exit code.
///
/// A [`PairwatchError`] anywhere in the chain yields its sysexits code;
/// anything else exits with 1.
pub fn failure_exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PairwatchError>() {
        Some(cause) => {
            error!(
                code = cause.error_code(),
                fatal = cause.is_fatal(),
                error = %err,
                "pairwatch stopped"
            );
            u8::try_from(cause.exit_code()).unwrap_or(1)
        }
        None => {
            error!(error = %err, "pairwatch stopped");
            1
        }
    }
}

/// Completes on SIGINT or SIGTERM (Ctrl+C elsewhere).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "Cannot install signal handlers, running until stopped");
                std::future::pending::<()>().await;
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown..."),
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown..."),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for Ctrl+C, running until stopped");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, initiating shutdown...");
    }
}

/// Completes after `duration_secs`, or never when it is zero.
pub async fn run_deadline(duration_secs: u64) {
    if duration_secs == 0 {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(Duration::from_secs(duration_secs)).await;
        info!(duration_secs, "Configured run duration elapsed");
    }
}

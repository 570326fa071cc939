//! Logging setup.
//!
//! Stdout belongs to the reports, so log events never go there:
//! - **Production**: JSON to daily files, compact lines to stderr
//! - **Development**: pretty, colored lines to stderr

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use pairwatch_core::LoggingConfig;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Flush guards for the non-blocking writers, held until exit.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static CONSOLE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "pairwatch";

/// How console lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    /// One line per event, no colors; suited to journald.
    Compact,
    /// Multi-line, colored, with source locations.
    Pretty,
}

/// Outputs chosen for a [`LoggingConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPlan {
    /// Filter directive used when `RUST_LOG` is unset.
    pub directive: String,
    /// Directory for the daily JSON files, if any.
    pub file_dir: Option<PathBuf>,
    /// Console rendering.
    pub console: ConsoleFormat,
}

impl LogPlan {
    /// Plan the outputs for `config`.
    #[must_use]
    pub fn from_config(config: &LoggingConfig) -> Self {
        if config.production {
            Self {
                directive: config.level.clone(),
                file_dir: Some(log_directory()),
                console: ConsoleFormat::Compact,
            }
        } else {
            Self {
                directive: config.level.clone(),
                file_dir: None,
                console: ConsoleFormat::Pretty,
            }
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
///
/// # Errors
///
/// Returns an error if the filter does not parse, the log directory cannot
/// be created, or a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let plan = LogPlan::from_config(config);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&plan.directive))
        .with_context(|| format!("Invalid log filter '{}'", plan.directive))?;

    let file_layer = match &plan.file_dir {
        Some(dir) => Some(json_file_layer(dir)?),
        None => None,
    };

    let console = match plan.console {
        ConsoleFormat::Compact => {
            let (writer, guard) = tracing_appender::non_blocking(console_stream());
            let _ = CONSOLE_GUARD.set(guard);
            console_layer(ConsoleFormat::Compact, writer)
        }
        ConsoleFormat::Pretty => console_layer(ConsoleFormat::Pretty, console_stream),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console)
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(())
}

/// The stream console lines go to.
fn console_stream() -> io::Stderr {
    io::stderr()
}

fn console_layer<S, W>(format: ConsoleFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        ConsoleFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .boxed(),
        ConsoleFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    }
}

fn json_file_layer<S>(dir: &Path) -> anyhow::Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);

    Ok(tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .boxed())
}

fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/pairwatch")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "pairwatch")
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn config(production: bool) -> LoggingConfig {
        LoggingConfig {
            level: "info,pairwatch_core=debug".to_string(),
            production,
        }
    }

    #[test]
    fn test_production_plan_writes_files_and_compact_console() {
        let plan = LogPlan::from_config(&config(true));
        assert_eq!(plan.console, ConsoleFormat::Compact);
        assert!(plan.file_dir.is_some_and(|dir| !dir.as_os_str().is_empty()));
        assert!(EnvFilter::try_new(&plan.directive).is_ok());
    }

    #[test]
    fn test_development_plan_is_console_only() {
        let plan = LogPlan::from_config(&config(false));
        assert_eq!(plan.console, ConsoleFormat::Pretty);
        assert_eq!(plan.file_dir, None);
    }

    #[test]
    fn test_console_is_stderr() {
        // Reports are printed to stdout; the console stream must be a different one.
        let _stream: io::Stderr = console_stream();
    }

    #[test]
    fn test_compact_console_lines_are_plain() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::registry()
            .with(console_layer(ConsoleFormat::Compact, capture.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(device_id = 7, "Cached new device");
        });

        let output = capture.contents();
        assert!(output.contains("Cached new device"));
        assert!(output.contains("device_id=7"));
        assert!(!output.contains('\u{1b}'));
        assert_eq!(output.lines().count(), 1);
    }

    #[test]
    fn test_json_file_layer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        let layer = json_file_layer::<tracing_subscriber::Registry>(&nested);
        assert!(layer.is_ok());
        assert!(nested.is_dir());
    }
}

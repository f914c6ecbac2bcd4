//! Logging for devpulse
//!
//! Everything goes to daily-rotated files under `$XDG_STATE_HOME/devpulse/`
//! (`devpulse.log.YYYY-MM-DD`). Stdout carries only the JSON analysis output.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};

/// Prefix of every log file; rotation appends the date.
pub const LOG_FILE_PREFIX: &str = "devpulse.log";

/// Install the global subscriber writing to the XDG state directory.
///
/// `RUST_LOG` wins over `logging.level`. Keep the returned guard alive for
/// the whole run; dropping it flushes pending lines.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    let (writer, guard) = file_writer(&log_dir, config.max_files)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Non-blocking writer over a daily-rotating file in `dir`, keeping at most
/// `max_files` files.
fn file_writer(dir: &Path, max_files: usize) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(max_files.max(1))
        .build(dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {}", e)))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Test subscriber on the test writer; safe to call from every test.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Keeps the background log writer alive.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_file_writer_creates_dated_file() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("state").join("devpulse");

        let (mut writer, guard) = file_writer(&log_dir, 0).unwrap();
        writer.write_all(b"analysis started\n").unwrap();
        drop(writer);
        drop(guard);

        let files: Vec<_> = std::fs::read_dir(&log_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);

        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(LOG_FILE_PREFIX));
        assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "analysis started\n");
    }
}

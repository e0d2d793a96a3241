//! File-only tracing setup.
//!
//! The terminal belongs to the UI, so nothing is written to stdout or
//! stderr. Output goes to `coinpulse.log` in the configured directory,
//! truncated at startup. `RUST_LOG` overrides the configured filter.

use color_eyre::{eyre::eyre, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "coinpulse.log";

/// Keeps the background writer alive; dropping it flushes the log file.
pub struct LoggingGuard {
  _file_guard: WorkerGuard,
  path: PathBuf,
}

impl LoggingGuard {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

pub fn init_logging(log_dir: &Path, default_filter: &str) -> Result<LoggingGuard> {
  let path = prepare_log_file(log_dir)?;

  let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
  let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(non_blocking_file)
    .with_ansi(false)
    .with_target(false);

  let env_filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(default_filter))
    .map_err(|e| eyre!("Invalid log filter {:?}: {}", default_filter, e))?;

  tracing_subscriber::registry()
    .with(env_filter)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(LoggingGuard {
    _file_guard: file_guard,
    path,
  })
}

/// Create the directory and truncate the previous session's log.
fn prepare_log_file(log_dir: &Path) -> Result<PathBuf> {
  fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;
  let path = log_dir.join(LOG_FILE);
  fs::write(&path, "").map_err(|e| eyre!("Failed to reset log file {}: {}", path.display(), e))?;
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_prepare_creates_directory_and_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("nested").join("logs");

    let path = prepare_log_file(&log_dir).unwrap();
    assert!(path.exists());

    fs::write(&path, "previous session").unwrap();
    prepare_log_file(&log_dir).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "");
  }
}

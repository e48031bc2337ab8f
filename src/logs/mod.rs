//! Tracing setup: stdout plus an `app.log` file in the recording folder.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::global::LOG_FILE_NAME;

pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE_NAME)
}

/// Open the log file for appending, creating its directory.
pub fn open_log_file(dir: &Path) -> Result<File> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))?;
    let path = log_file_path(dir);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}

/// Install the global subscriber. `RUST_LOG` overrides the level.
///
/// The file layer is best effort: if it cannot be opened the service logs a
/// warning and continues with stdout only.
pub fn init(verbose: bool, log_dir: Option<&Path>) {
    let log_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file, file_error) = match log_dir.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!("Logging to stdout only: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_directory_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Recordings");

        {
            use std::io::Write;
            let mut file = open_log_file(&nested).unwrap();
            writeln!(file, "first").unwrap();
        }
        {
            use std::io::Write;
            let mut file = open_log_file(&nested).unwrap();
            writeln!(file, "second").unwrap();
        }

        let content = std::fs::read_to_string(log_file_path(&nested)).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}

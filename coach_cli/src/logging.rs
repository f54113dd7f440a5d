use anyhow::{Context, Result};
use coach_core::config::app_dir;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const FILTER_ENV: &str = "COACH_LOG";

/// `~/.interview-coach/logs/latest.log`
pub fn log_file_path() -> PathBuf {
    app_dir().join("logs").join("latest.log")
}

/// Route tracing output to the log file so it never interleaves with the
/// transcript. `--debug` overrides `COACH_LOG`.
pub fn init(debug: bool) -> Result<PathBuf> {
    let path = log_file_path();
    init_at(&path, debug)?;
    Ok(path)
}

fn init_at(path: &Path, debug: bool) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("Logger already initialised")?;

    tracing::info!(path = %path.display(), "Logging started");
    Ok(())
}

//! Logging initialization.
//!
//! Every run writes to stderr and to its own file under the log directory,
//! named `logs-YYYYMMDD_HHMMSS.log`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level for a `-v` count.
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Path of the log file for a run started at `now`.
pub fn log_file_path(log_dir: &Path, now: chrono::DateTime<chrono::Local>) -> PathBuf {
    log_dir.join(format!("logs-{}.log", now.format("%Y%m%d_%H%M%S")))
}

/// Initialize the subscriber. Returns the path of the log file.
///
/// `RUST_LOG` overrides the level derived from `-v`.
pub fn init_logging(log_dir: &Path, level: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir, chrono::Local::now());
    let file = File::create(&path)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("portage={level}").into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
        .init();

    tracing::info!(level, path = %path.display(), "Logging initialized");
    Ok(path)
}

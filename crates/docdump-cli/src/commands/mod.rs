pub mod backup;
pub mod list;
pub mod restore;

use anyhow::{Context, Result};
use docdump_core::Config;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, Dispatch};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Load and validate a run file
pub async fn load_config(config_path: &str) -> Result<Config> {
    info!("Loading configuration from: {}", config_path);

    let config_content = tokio::fs::read_to_string(config_path)
        .await
        .with_context(|| format!("failed to read {}", config_path))?;
    let config = Config::from_yaml(&config_content)?;
    Ok(config)
}

/// Build a run's log sink: the usual console output plus a plain-text copy
/// appended to `path`
pub fn file_logger(path: &Path, level: &str) -> Result<Dispatch> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let subscriber = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(EnvFilter::new(level));
    Ok(Dispatch::new(subscriber))
}

//! Tracing setup for the binaries: console output plus an optional
//! per-binary log file taken from the `[logging]` config table.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const MAX_LOG_BYTES: u64 = 10_000_000;

/// Install the global subscriber for `binary`.
///
/// `RUST_LOG` overrides the default `info` filter. When the config maps the
/// binary to a log file, a second non-ANSI layer appends there; the file is
/// rotated into an `archive/` sibling once it exceeds 10 MB.
pub fn init(config: &Config, binary: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer();

    match config.log_path(binary) {
        Some(path) => {
            let file = open_rotated(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file));

            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file_layer)
                .init();
            info!(log = %path.display(), "logging to file");
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
        }
    }

    Ok(())
}

fn open_rotated(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if let Ok(meta) = std::fs::metadata(path) {
        if meta.len() > MAX_LOG_BYTES {
            rotate(path)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

fn rotate(path: &Path) -> std::io::Result<()> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("clusterq");
    let archive_dir = path.parent().unwrap_or(Path::new(".")).join("archive");
    std::fs::create_dir_all(&archive_dir)?;

    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    std::fs::rename(path, archive_dir.join(format!("{stem}_{stamp}.log")))
}

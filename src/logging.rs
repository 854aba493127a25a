//! Log subscriber setup.

use anyhow::{Context, anyhow};
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing::Level;

use crate::config::LoggingConfig;

/// Installs the global subscriber. Records go to the configured file,
/// opened for append, or to stderr when no file is set.
///
/// Call once, before forking: workers inherit the subscriber and its file.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(Level::from(cfg.level));

    let installed = match &cfg.file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow!("cannot install log subscriber: {e}"))
}

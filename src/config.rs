//! Server settings.
//!
//! Settings come from an optional YAML file named by `STATICD_CONFIG`,
//! followed by a couple of environment overrides (`LISTEN`, `STATIC_ROOT`).
//! Every field has a default, so an empty document is a valid config.

use anyhow::{Context, bail};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the path of the YAML config file.
pub const CONFIG_ENV: &str = "STATICD_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
    pub logging: LoggingConfig,
}

/// Listener and worker pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port to bind, e.g. `0.0.0.0:13337`.
    pub listen_addr: String,
    /// Number of worker processes forked by the listener.
    pub workers: usize,
    /// Total connection budget. Used as the listen backlog and split evenly
    /// between workers.
    pub max_connections: usize,
    /// Milliseconds without progress before a connection is expired.
    /// `0` disables the timeout.
    pub idle_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:13337".to_string(),
            workers: 2,
            max_connections: 16384,
            idle_timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.listen_addr))
    }

    /// Connection slots owned by each worker.
    pub fn slots_per_worker(&self) -> usize {
        (self.max_connections / self.workers.max(1)).max(1)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// How file reads are serialized against other processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    Shared,
    Exclusive,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Document root. Must exist; canonicalized at startup.
    pub root: PathBuf,
    /// File served for `GET /` when present in the root.
    pub index: Option<String>,
    pub lock: LockMode,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./static"),
            index: Some("index.html".to_string()),
            lock: LockMode::Shared,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Append-only log file. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: Some(PathBuf::from("logs/server_log.txt")),
        }
    }
}

impl Config {
    /// Loads the config file (if any), applies environment overrides and
    /// validates the result.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read config file {:?}", path))?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }
        if let Some(root) = std::env::var_os("STATIC_ROOT") {
            cfg.static_files.root = PathBuf::from(root);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        // An empty document deserializes to unit, not to a mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("invalid config document")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.server.socket_addr()?;
        if self.server.workers == 0 {
            bail!("server.workers must be >= 1");
        }
        if self.server.max_connections < self.server.workers {
            bail!(
                "server.max_connections ({}) must be >= server.workers ({})",
                self.server.max_connections,
                self.server.workers
            );
        }
        Ok(())
    }
}

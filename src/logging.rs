//! Logging setup for binaries embedding the engine
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! left to the host. `init_logging` installs the one used by the CLI: an
//! `EnvFilter` honouring `RUST_LOG`, a compact or JSON stderr layer and an
//! optional daily-rotated log file.

use crate::error::{HandlerError, Result};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Variable naming a log file, e.g. `ERROR_HANDLER_LOG_FILE=/var/log/recovery.log`
pub const LOG_FILE_ENV: &str = "ERROR_HANDLER_LOG_FILE";
/// Set to `json` for JSON log lines
pub const LOG_FORMAT_ENV: &str = "ERROR_HANDLER_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,

    /// Also log to a daily-rotated file
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Emit JSON instead of compact text
    pub json: bool,

    /// Include thread IDs
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            json: false,
            thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(log_file) = std::env::var(LOG_FILE_ENV) {
            if !log_file.trim().is_empty() {
                config.file_path = Some(PathBuf::from(log_file));
            }
        }

        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            config.json = format.eq_ignore_ascii_case("json");
        }

        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn output_layer<W>(&self, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
    where
        W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(self.thread_ids);

        if self.json {
            layer.json().boxed()
        } else {
            layer.compact().with_ansi(ansi).boxed()
        }
    }
}

/// Install the global subscriber; fails if one is already installed
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let mut layers = Vec::new();
    if config.stderr {
        layers.push(config.output_layer(std::io::stderr, true));
    }

    if let Some(file_path) = &config.file_path {
        let directory = match file_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory)?;

        let file_name = file_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "error-recovery.log".into());
        let file_appender = tracing_appender::rolling::daily(directory, file_name);
        layers.push(config.output_layer(file_appender, false));
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| HandlerError::config(format!("Failed to install log subscriber: {e}")))
}

use std::path::PathBuf;

use config::{Config as RawConfig, Environment, File, FileFormat};
use tracing::{debug, warn};

use crate::config::HandlerConfig;
use crate::error::{HandlerError, Result};

/// Environment variable prefix, e.g. `ERROR_HANDLER__MAX_HISTORY_SIZE=100`
/// or `ERROR_HANDLER__RETRY__BASE_DELAY=250ms`
pub const ENV_PREFIX: &str = "ERROR_HANDLER";

/// Layers an optional TOML file under environment overrides
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    use_environment: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            explicit_file: None,
            use_environment: true,
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Ignore `ERROR_HANDLER__*` variables
    pub fn without_environment(mut self) -> Self {
        self.use_environment = false;
        self
    }

    /// Build and validate the configuration
    pub fn load(&self) -> Result<HandlerConfig> {
        let raw = self.build()?;
        let config: HandlerConfig = raw
            .try_deserialize()
            .map_err(|e| HandlerError::config(format!("Failed to parse configuration: {e}")))?;

        config.validate()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    pub fn build(&self) -> Result<RawConfig> {
        let mut builder = RawConfig::builder();

        if let Some(path) = &self.explicit_file {
            if path.exists() {
                let path_str = path.to_string_lossy().into_owned();
                builder = builder.add_source(File::new(&path_str, FileFormat::Toml).required(true));
            } else {
                warn!(
                    "Configuration file not found at {} - falling back to defaults and environment variables",
                    path.display()
                );
            }
        }

        if self.use_environment {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        builder.build().map_err(|e| {
            HandlerError::config(format!("Failed to build configuration sources: {e}"))
        })
    }
}

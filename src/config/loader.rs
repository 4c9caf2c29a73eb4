//! Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file and `CALCFLOW__*` environment variables.

use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::ConfigResult;
use super::CalcflowConfig;

/// Environment variable naming a TOML file when no explicit path is given
pub const CONFIG_PATH_ENV: &str = "CALCFLOW_CONFIG_PATH";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: CalcflowConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load and validate configuration.
    ///
    /// An explicit `path` must exist. A path taken from `CALCFLOW_CONFIG_PATH` must too. With
    /// neither, only defaults and environment overrides apply.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let source = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut builder = Config::builder().add_source(Config::try_from(&CalcflowConfig::default())?);
        if let Some(file) = &source {
            debug!(path = %file.display(), "loading configuration file");
            builder = builder.add_source(File::from(file.as_path()).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix("CALCFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: CalcflowConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            workers = config.workers.initial_size,
            delay_unit_ms = config.workers.delay_unit_ms,
            database = %config.database.url,
            "configuration loaded"
        );
        Ok(Self { config, source })
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: CalcflowConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source: None,
        })
    }

    pub fn config(&self) -> &CalcflowConfig {
        &self.config
    }

    pub fn into_config(self) -> CalcflowConfig {
        self.config
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

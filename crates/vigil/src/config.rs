//! Layered Vigil configuration.
//!
//! Sources, later ones overriding earlier ones:
//! - Bundled defaults (include_str! from vigil.toml)
//! - `~/.config/vigil/vigil.toml`
//! - `./vigil.toml`
//!
//! An explicit file replaces the two user layers.

use config::{Config, File, FileFormat};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use vigil_cache::CacheConfig;
use vigil_error::{ConfigError, VigilResult};
use vigil_monitor::MonitorConfig;
use vigil_rate_limit::{CalendarConfig, RollingConfig};
use vigil_storage::DataLayout;

const DEFAULT_CONFIG: &str = include_str!("../../../vigil.toml");

/// Top-level configuration.
///
/// # Example
///
/// ```no_run
/// use vigil::VigilConfig;
///
/// # fn main() -> vigil::VigilResult<()> {
/// let config = VigilConfig::load()?;
/// println!("State lives in {}", config.data_dir().display());
/// # Ok(())
/// # }
/// ```
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct VigilConfig {
    /// Directory holding every persisted document
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,

    /// Rolling-window admission
    #[serde(default)]
    rolling: RollingConfig,

    /// Calendar-day admission
    #[serde(default)]
    calendar: CalendarConfig,

    /// Request cache
    #[serde(default)]
    cache: CacheConfig,

    /// Account monitoring
    #[serde(default)]
    monitor: MonitorConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            rolling: RollingConfig::default(),
            calendar: CalendarConfig::default(),
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl VigilConfig {
    /// Load bundled defaults overlaid with the user files that exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or the merged
    /// configuration is invalid.
    #[instrument]
    pub fn load() -> VigilResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder = Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/vigil/vigil.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("vigil").required(false));
        Self::finish(builder)
    }

    /// Load bundled defaults overlaid with one explicit file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or the
    /// merged configuration is invalid.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> VigilResult<Self> {
        debug!("Loading configuration from file");
        let builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path.as_ref()));
        Self::finish(builder)
    }

    /// [`from_file`](Self::from_file) when a path is given, [`load`](Self::load) otherwise.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load) and [`from_file`](Self::from_file).
    pub fn resolve(path: Option<&Path>) -> VigilResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Parse a complete TOML document on top of the bundled defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or is invalid.
    pub fn from_toml_str(document: &str) -> VigilResult<Self> {
        let builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(document, FileFormat::Toml));
        Self::finish(builder)
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> VigilResult<Self> {
        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rolling.validate()?;
        self.calendar.validate()?;
        self.monitor.validate()?;
        if *self.cache.max_entries() == 0 {
            return Err(ConfigError::new("cache.max_entries must be positive"));
        }
        Ok(())
    }

    /// File layout under [`data_dir`](Self::data_dir).
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }
}

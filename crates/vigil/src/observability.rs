//! Log output setup for the `vigil` binary.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
use vigil_error::{ConfigError, VigilResult};

/// How logs are filtered and rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "vigil=debug")
    pub log_level: String,
    /// Emit one JSON object per event instead of text
    pub json_logs: bool,
}

impl LoggingConfig {
    /// Text logs at `info`.
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Set the fallback filter.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Lower the fallback filter to `debug` when `verbose` is set.
    pub fn with_verbose(self, verbose: bool) -> Self {
        if verbose {
            self.with_log_level("debug")
        } else {
            self
        }
    }

    /// Enable JSON-formatted logs.
    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    /// Filter in effect: a valid `RUST_LOG`, the configured level otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured level is not a valid directive.
    pub fn env_filter(&self) -> VigilResult<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .map_err(|e| {
                ConfigError::new(format!("Invalid log filter '{}': {}", self.log_level, e)).into()
            })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr so command output on stdout stays parseable.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> VigilResult<()> {
    let env_filter = config.env_filter()?;

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ConfigError::new(format!("Failed to install log subscriber: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn verbose_lowers_the_level() {
        assert_eq!(LoggingConfig::new().with_verbose(true).log_level, "debug");
        assert_eq!(LoggingConfig::new().with_verbose(false).log_level, "info");
    }

    #[test]
    fn malformed_directive_is_rejected() {
        let config = LoggingConfig::new().with_log_level("vigil=loud");
        if env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            assert!(config.env_filter().is_err());
        }
    }
}

//! Structured logging setup
//!
//! All crate code logs through `tracing`. Hosts that already install a
//! subscriber can skip [`init_logging`]; the CLI calls it once at startup.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub level: String,
    /// Module-specific log levels
    pub module_levels: BTreeMap<String, String>,
    /// Emit one JSON object per event instead of human-readable lines
    pub json_format: bool,
    /// Include the event target (module path) in human-readable output
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = BTreeMap::new();
        module_levels.insert("memsentinel::monitoring".to_string(), "info".to_string());
        module_levels.insert("memsentinel::optimization".to_string(), "info".to_string());

        Self {
            level: "info".to_string(),
            module_levels,
            json_format: false,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Build the filter: `RUST_LOG` wins, otherwise configured levels apply
    pub fn env_filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", self.level, e)))?;

        for (module, level) in &self.module_levels {
            let directive = format!("{}={}", module, level)
                .parse()
                .map_err(|e| Error::Config(format!("Invalid directive for {}: {}", module, e)))?;
            filter = filter.add_directive(directive);
        }

        Ok(filter)
    }
}

/// Install the global tracing subscriber.
///
/// Fails with [`Error::Config`] if a subscriber is already installed or the
/// configured levels don't parse.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;

    let installed = if config.json_format {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };

    installed.map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        let config = LoggingConfig::default();
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_bad_module_level_rejected() {
        // Only meaningful when RUST_LOG is not set for the test run
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let mut config = LoggingConfig::default();
        config
            .module_levels
            .insert("memsentinel".to_string(), "loud".to_string());
        assert!(config.env_filter().is_err());
    }
}

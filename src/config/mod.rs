//! Configuration management for memsentinel
//!
//! This module provides centralized configuration with:
//! - TOML file loading with environment presets
//! - `MEMSENTINEL_*` environment overrides
//! - Validation before anything is wired up

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::monitoring::pressure::{PressureLevel, PressureThresholds};
use crate::optimization::advisor::RecommendationSort;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub collection: CollectionConfig,
    pub patterns: PatternConfig,
    pub pressure: PressureConfig,
    pub leak: LeakConfig,
    pub alerts: AlertConfig,
    pub cleanup: CleanupConfig,
    pub advisor: AdvisorConfig,
    pub logging: LoggingConfig,
}

/// Snapshot sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub history_capacity: usize,
}

/// Pattern detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Passes are skipped until history holds this many snapshots
    pub min_samples: usize,
    pub analysis_window: usize,
    pub leak_threshold_mb_per_min: f64,
    pub spike_factor: f64,
    pub spike_min_count: usize,
    pub fragmentation_ratio: f64,
    pub collection_rate_per_min: f64,
    pub cyclic_min_period: usize,
    pub cyclic_tolerance_mb: f64,
    pub correlation_threshold: f64,
    pub confidence_saturation_points: usize,
    pub max_retained: usize,
}

/// Pressure classification and trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub smoothing_window: usize,
    pub thresholds: PressureThresholds,
    pub trend_window: usize,
    pub increasing_rate: f64,
    pub decreasing_rate: f64,
}

/// Leak confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakConfig {
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub confirmation_threshold: usize,
    pub max_records: usize,
}

/// Alert rate limiting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    pub max_per_minute: usize,
    pub queue_size: usize,
    pub escalate_after_consecutive: u32,
}

/// Minimum time between automatic cleanup runs at each pressure level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelIntervals {
    #[serde(with = "humantime_serde")]
    pub critical: Duration,
    #[serde(with = "humantime_serde")]
    pub high: Duration,
    #[serde(with = "humantime_serde")]
    pub moderate: Duration,
    #[serde(with = "humantime_serde")]
    pub low: Duration,
    #[serde(with = "humantime_serde")]
    pub normal: Duration,
}

/// Cleanup orchestration and emergency mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    /// How often the automatic trigger policy is evaluated
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub minimum_gain_mb: f64,
    pub emergency_threshold_mb: f64,
    /// Emergency mode exits below this share of the emergency threshold
    pub emergency_exit_ratio: f64,
    #[serde(with = "humantime_serde")]
    pub emergency_pause: Duration,
    pub level_intervals: LevelIntervals,
    pub max_history: usize,
}

/// Advisory passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_recommendations: usize,
    pub sort: RecommendationSort,
    pub max_insights: usize,
}

/// Deployment environment used to pick preset defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "testing" | "test" => Ok(Self::Testing),
            "development" | "dev" => Ok(Self::Development),
            other => Err(Error::Config(format!("Unknown environment: {}", other))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        };
        f.write_str(s)
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(1),
            history_capacity: 300,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            min_samples: 10,
            analysis_window: 60,
            leak_threshold_mb_per_min: 5.0,
            spike_factor: 1.5,
            spike_min_count: 3,
            fragmentation_ratio: 0.30,
            collection_rate_per_min: 5.0,
            cyclic_min_period: 5,
            cyclic_tolerance_mb: 5.0,
            correlation_threshold: 0.7,
            confidence_saturation_points: 30,
            max_retained: 200,
        }
    }
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(5),
            smoothing_window: 3,
            thresholds: PressureThresholds::default(),
            trend_window: 10,
            increasing_rate: 0.10,
            decreasing_rate: -0.05,
        }
    }
}

impl Default for LeakConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(180),
            confirmation_threshold: 2,
            max_records: 50,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown: Duration::from_secs(60),
            max_per_minute: 3,
            queue_size: 10,
            escalate_after_consecutive: 5,
        }
    }
}

impl Default for LevelIntervals {
    fn default() -> Self {
        Self {
            critical: Duration::from_secs(10),
            high: Duration::from_secs(30),
            moderate: Duration::from_secs(60),
            low: Duration::from_secs(90),
            normal: Duration::from_secs(120),
        }
    }
}

impl LevelIntervals {
    pub fn for_level(&self, level: PressureLevel) -> Duration {
        match level {
            PressureLevel::Critical => self.critical,
            PressureLevel::High => self.high,
            PressureLevel::Moderate => self.moderate,
            PressureLevel::Low => self.low,
            PressureLevel::Normal => self.normal,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
            minimum_gain_mb: 1.0,
            emergency_threshold_mb: 2560.0,
            emergency_exit_ratio: 0.8,
            emergency_pause: Duration::from_millis(50),
            level_intervals: LevelIntervals::default(),
            max_history: 100,
        }
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            max_recommendations: 10,
            sort: RecommendationSort::default(),
            max_insights: 50,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_for_environment(Environment::Development)
    }
}

impl Config {
    /// Load configuration from `MEMSENTINEL_CONFIG_PATH` and the environment.
    ///
    /// Without a config path the preset for `MEMSENTINEL_ENV` is used.
    pub fn load() -> Result<Self> {
        let mut config = match env::var("MEMSENTINEL_CONFIG_PATH") {
            Ok(path) => Self::load_from_file(Path::new(&path))?,
            Err(_) => {
                let environment = match env::var("MEMSENTINEL_ENV") {
                    Ok(value) => value.parse()?,
                    Err(_) => Environment::default(),
                };
                Self::default_for_environment(environment)
            }
        };

        config.override_from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Override configuration with `MEMSENTINEL_*` environment variables
    pub fn override_from_env(&mut self) -> Result<()> {
        self.override_from_vars(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn override_from_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MEMSENTINEL_HISTORY_CAPACITY") {
            self.collection.history_capacity = parse_var("MEMSENTINEL_HISTORY_CAPACITY", &val)?;
        }

        if let Some(val) = lookup("MEMSENTINEL_COLLECTION_INTERVAL_MS") {
            let millis: u64 = parse_var("MEMSENTINEL_COLLECTION_INTERVAL_MS", &val)?;
            self.collection.interval = Duration::from_millis(millis);
        }

        if let Some(val) = lookup("MEMSENTINEL_LEAK_THRESHOLD_MB_PER_MIN") {
            self.patterns.leak_threshold_mb_per_min =
                parse_var("MEMSENTINEL_LEAK_THRESHOLD_MB_PER_MIN", &val)?;
        }

        if let Some(val) = lookup("MEMSENTINEL_EMERGENCY_THRESHOLD_MB") {
            self.cleanup.emergency_threshold_mb = parse_var("MEMSENTINEL_EMERGENCY_THRESHOLD_MB", &val)?;
        }

        if let Some(val) = lookup("MEMSENTINEL_MAX_RECOMMENDATIONS") {
            self.advisor.max_recommendations = parse_var("MEMSENTINEL_MAX_RECOMMENDATIONS", &val)?;
        }

        if let Some(val) = lookup("MEMSENTINEL_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Some(val) = lookup("MEMSENTINEL_LOG_JSON") {
            self.logging.json_format = parse_var("MEMSENTINEL_LOG_JSON", &val)?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.collection.history_capacity == 0 {
            return Err(Error::Config("History capacity must be > 0".to_string()));
        }

        if self.collection.interval.is_zero() {
            return Err(Error::Config("Collection interval must be > 0".to_string()));
        }

        if self.patterns.min_samples == 0 || self.patterns.analysis_window == 0 {
            return Err(Error::Config(
                "Pattern min samples and analysis window must be > 0".to_string(),
            ));
        }

        if self.patterns.leak_threshold_mb_per_min <= 0.0 {
            return Err(Error::Config("Leak threshold must be > 0".to_string()));
        }

        let spike_factor = self.patterns.spike_factor;
        if !spike_factor.is_finite() || spike_factor <= 1.0 || self.patterns.spike_min_count == 0 {
            return Err(Error::Config(
                "Spike factor must be > 1 and spike min count > 0".to_string(),
            ));
        }

        let fragmentation = self.patterns.fragmentation_ratio;
        if fragmentation <= 0.0 || !(0.0..1.0).contains(&fragmentation) {
            return Err(Error::Config(
                "Fragmentation ratio must be in (0, 1)".to_string(),
            ));
        }

        if self.patterns.collection_rate_per_min <= 0.0 {
            return Err(Error::Config("Collection rate threshold must be > 0".to_string()));
        }

        let tolerance = self.patterns.cyclic_tolerance_mb;
        if self.patterns.cyclic_min_period == 0 || !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::Config(
                "Cyclic min period must be > 0 and tolerance >= 0".to_string(),
            ));
        }

        let correlation = self.patterns.correlation_threshold;
        if correlation <= 0.0 || !(0.0..1.0).contains(&correlation) {
            return Err(Error::Config(
                "Correlation threshold must be in (0, 1)".to_string(),
            ));
        }

        if self.patterns.confidence_saturation_points == 0 {
            return Err(Error::Config(
                "Confidence saturation points must be > 0".to_string(),
            ));
        }

        if self.pressure.smoothing_window == 0 || self.pressure.trend_window == 0 {
            return Err(Error::Config(
                "Pressure smoothing and trend windows must be > 0".to_string(),
            ));
        }

        self.pressure
            .thresholds
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        if self.cleanup.emergency_threshold_mb <= self.pressure.thresholds.critical {
            return Err(Error::Config(
                "Emergency threshold must be above the critical pressure threshold".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.cleanup.emergency_exit_ratio) {
            return Err(Error::Config(
                "Emergency exit ratio must be in [0, 1)".to_string(),
            ));
        }

        if self.leak.confirmation_threshold == 0 {
            return Err(Error::Config("Confirmation threshold must be > 0".to_string()));
        }

        if self.alerts.max_per_minute == 0 {
            return Err(Error::Config("Alert cap must be > 0".to_string()));
        }

        if self.cleanup.minimum_gain_mb <= 0.0 {
            return Err(Error::Config("Minimum cleanup gain must be > 0".to_string()));
        }

        if self.advisor.max_recommendations == 0 {
            return Err(Error::Config("Max recommendations must be > 0".to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml()?;

        fs::write(path, contents)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Generate default configuration for an environment
    pub fn default_for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production_defaults(),
            Environment::Testing => Self::testing_defaults(),
            Environment::Development => Self::development_defaults(),
        }
    }

    fn development_defaults() -> Self {
        Config {
            environment: Environment::Development,
            collection: CollectionConfig::default(),
            patterns: PatternConfig::default(),
            pressure: PressureConfig::default(),
            leak: LeakConfig::default(),
            alerts: AlertConfig::default(),
            cleanup: CleanupConfig::default(),
            advisor: AdvisorConfig::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                ..LoggingConfig::default()
            },
        }
    }

    fn production_defaults() -> Self {
        Config {
            environment: Environment::Production,
            collection: CollectionConfig {
                history_capacity: 600,
                ..CollectionConfig::default()
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json_format: true,
                ..LoggingConfig::default()
            },
            ..Self::development_defaults()
        }
    }

    /// Short intervals so timer loops turn over quickly under test
    fn testing_defaults() -> Self {
        Config {
            environment: Environment::Testing,
            collection: CollectionConfig {
                enabled: true,
                interval: Duration::from_millis(20),
                history_capacity: 200,
            },
            patterns: PatternConfig {
                interval: Duration::from_millis(100),
                min_samples: 5,
                ..PatternConfig::default()
            },
            pressure: PressureConfig {
                interval: Duration::from_millis(50),
                ..PressureConfig::default()
            },
            leak: LeakConfig {
                window: Duration::from_secs(1),
                ..LeakConfig::default()
            },
            alerts: AlertConfig {
                cooldown: Duration::from_millis(200),
                ..AlertConfig::default()
            },
            cleanup: CleanupConfig {
                interval: Duration::from_millis(100),
                emergency_pause: Duration::from_millis(1),
                level_intervals: LevelIntervals {
                    critical: Duration::from_millis(100),
                    high: Duration::from_millis(200),
                    moderate: Duration::from_millis(300),
                    low: Duration::from_millis(400),
                    normal: Duration::from_millis(500),
                },
                ..CleanupConfig::default()
            },
            advisor: AdvisorConfig {
                interval: Duration::from_millis(200),
                ..AdvisorConfig::default()
            },
            logging: LoggingConfig {
                level: "warn".to_string(),
                ..LoggingConfig::default()
            },
        }
    }

    /// Default location for a config file next to the working directory
    pub fn default_path() -> PathBuf {
        PathBuf::from("memsentinel.toml")
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_presets_validate() {
        for environment in [
            Environment::Development,
            Environment::Testing,
            Environment::Production,
        ] {
            let config = Config::default_for_environment(environment);
            assert!(config.validate().is_ok(), "{} preset invalid", environment);
            assert_eq!(config.environment, environment);
        }
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.collection.history_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pressure.thresholds.high = config.pressure.thresholds.moderate;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cleanup.emergency_threshold_mb = config.pressure.thresholds.critical;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.alerts.max_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cleanup.minimum_gain_mb = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.advisor.max_recommendations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_detector_thresholds() {
        let mut config = Config::default();
        config.patterns.spike_min_count = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.patterns.spike_factor = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.patterns.correlation_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.patterns.correlation_threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.patterns.fragmentation_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.patterns.cyclic_min_period = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MEMSENTINEL_HISTORY_CAPACITY", "42"),
            ("MEMSENTINEL_COLLECTION_INTERVAL_MS", "250"),
            ("MEMSENTINEL_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .override_from_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.collection.history_capacity, 42);
        assert_eq!(config.collection.interval, Duration::from_millis(250));
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_bad_env_override_is_config_error() {
        let mut config = Config::default();
        let result = config.override_from_vars(|key| {
            (key == "MEMSENTINEL_HISTORY_CAPACITY").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [collection]
            interval = "500ms"

            [pressure.thresholds]
            low = 100.0
            moderate = 200.0
            high = 300.0
            critical = 400.0
            "#,
        )
        .unwrap();

        assert_eq!(config.collection.interval, Duration::from_millis(500));
        assert_eq!(config.collection.history_capacity, 300);
        assert_eq!(config.pressure.thresholds.critical, 400.0);
        assert_eq!(config.alerts.max_per_minute, 3);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Testing".parse::<Environment>().unwrap(), Environment::Testing);
        assert!("staging".parse::<Environment>().is_err());
    }
}

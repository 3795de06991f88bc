use crate::config::PressureConfig;
use crate::error::{Error, Result};
use crate::monitoring::trend::{Trend, TrendAnalyzer, TrendChange};
use crate::utils::stats::mean;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info};

const LEVEL_HISTORY: usize = 64;

/// Ordered classification of overall memory stress
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum PressureLevel {
    #[default]
    Normal,
    Low,
    Moderate,
    High,
    Critical,
}

impl PressureLevel {
    pub const ALL: [PressureLevel; 5] = [
        Self::Normal,
        Self::Low,
        Self::Moderate,
        Self::High,
        Self::Critical,
    ];
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lower bound in MB for each level above Normal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureThresholds {
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            low: 512.0,
            moderate: 1024.0,
            high: 1536.0,
            critical: 2048.0,
        }
    }
}

impl PressureThresholds {
    pub fn new(low: f64, moderate: f64, high: f64, critical: f64) -> Result<Self> {
        let thresholds = Self {
            low,
            moderate,
            high,
            critical,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Thresholds must be finite, non-negative and strictly increasing
    pub fn validate(&self) -> Result<()> {
        let values = [self.low, self.moderate, self.high, self.critical];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::InvalidThresholds(format!(
                "Thresholds must be finite and non-negative: {:?}",
                values
            )));
        }
        if values.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::InvalidThresholds(format!(
                "Thresholds must be strictly increasing: {:?}",
                values
            )));
        }
        Ok(())
    }

    /// Highest level whose threshold `value_mb` reaches
    pub fn level_for(&self, value_mb: f64) -> PressureLevel {
        if value_mb >= self.critical {
            PressureLevel::Critical
        } else if value_mb >= self.high {
            PressureLevel::High
        } else if value_mb >= self.moderate {
            PressureLevel::Moderate
        } else if value_mb >= self.low {
            PressureLevel::Low
        } else {
            PressureLevel::Normal
        }
    }

    /// Threshold for a level; Normal has none
    pub fn threshold_for(&self, level: PressureLevel) -> Option<f64> {
        match level {
            PressureLevel::Normal => None,
            PressureLevel::Low => Some(self.low),
            PressureLevel::Moderate => Some(self.moderate),
            PressureLevel::High => Some(self.high),
            PressureLevel::Critical => Some(self.critical),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelChange {
    pub from: PressureLevel,
    pub to: PressureLevel,
    pub smoothed_mb: f64,
    pub at: DateTime<Utc>,
}

/// Outcome of one analysis pass; each field fires at most once per pass
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PressureUpdate {
    pub level_change: Option<LevelChange>,
    pub trend_change: Option<TrendChange>,
}

/// Maps the smoothed recent average to a [`PressureLevel`].
///
/// The level is recomputed from scratch every pass; there is no hysteresis
/// beyond the smoothing window.
#[derive(Debug, Clone)]
pub struct PressureStateMachine {
    thresholds: PressureThresholds,
    smoothing_window: usize,
    level: PressureLevel,
    smoothed_mb: f64,
    trend: TrendAnalyzer,
    level_since: Option<DateTime<Utc>>,
    transitions: u64,
    passes: u64,
    peak_smoothed_mb: f64,
    recent_changes: VecDeque<LevelChange>,
}

impl PressureStateMachine {
    pub fn new(config: &PressureConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            smoothing_window: config.smoothing_window.max(1),
            level: PressureLevel::Normal,
            smoothed_mb: 0.0,
            trend: TrendAnalyzer::new(
                config.trend_window,
                config.increasing_rate,
                config.decreasing_rate,
            ),
            level_since: None,
            transitions: 0,
            passes: 0,
            peak_smoothed_mb: 0.0,
            recent_changes: VecDeque::with_capacity(LEVEL_HISTORY),
        }
    }

    /// How many trailing samples `analyze` needs to see
    pub fn required_samples(&self) -> usize {
        self.smoothing_window.max(self.trend.window())
    }

    /// Mean of the last `smoothing_window` values; `None` for an empty series
    pub fn smoothed(&self, totals: &[f64]) -> Option<f64> {
        if totals.is_empty() {
            return None;
        }
        let start = totals.len().saturating_sub(self.smoothing_window);
        Some(mean(&totals[start..]))
    }

    /// Recompute level and trend from the most recent totals (oldest first).
    ///
    /// An empty series leaves state untouched.
    pub fn analyze(&mut self, totals: &[f64], now: DateTime<Utc>) -> PressureUpdate {
        let Some(smoothed) = self.smoothed(totals) else {
            return PressureUpdate::default();
        };

        self.passes += 1;
        self.smoothed_mb = smoothed;
        self.peak_smoothed_mb = self.peak_smoothed_mb.max(smoothed);
        if self.level_since.is_none() {
            self.level_since = Some(now);
        }

        let mapped = self.thresholds.level_for(smoothed);
        let level_change = if mapped != self.level {
            let change = LevelChange {
                from: self.level,
                to: mapped,
                smoothed_mb: smoothed,
                at: now,
            };
            info!(
                from = %change.from,
                to = %change.to,
                smoothed_mb = smoothed,
                "Memory pressure level changed"
            );
            self.level = mapped;
            self.level_since = Some(now);
            self.transitions += 1;
            if self.recent_changes.len() >= LEVEL_HISTORY {
                self.recent_changes.pop_front();
            }
            self.recent_changes.push_back(change);
            Some(change)
        } else {
            None
        };

        let trend_change = self.trend.update(totals);
        if let Some(change) = trend_change {
            debug!(from = %change.from, to = %change.to, rate = change.rate, "Memory trend changed");
        }

        PressureUpdate {
            level_change,
            trend_change,
        }
    }

    /// Replace thresholds; an invalid set is rejected and the old one kept
    pub fn set_thresholds(&mut self, thresholds: PressureThresholds) -> Result<()> {
        thresholds.validate()?;
        info!(?thresholds, "Pressure thresholds updated");
        self.thresholds = thresholds;
        Ok(())
    }

    pub fn thresholds(&self) -> PressureThresholds {
        self.thresholds
    }

    pub fn level(&self) -> PressureLevel {
        self.level
    }

    pub fn trend(&self) -> Trend {
        self.trend.current()
    }

    pub fn trend_rate(&self) -> f64 {
        self.trend.last_rate()
    }

    pub fn smoothed_mb(&self) -> f64 {
        self.smoothed_mb
    }

    pub fn peak_smoothed_mb(&self) -> f64 {
        self.peak_smoothed_mb
    }

    pub fn level_since(&self) -> Option<DateTime<Utc>> {
        self.level_since
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn recent_changes(&self) -> Vec<LevelChange> {
        self.recent_changes.iter().copied().collect()
    }

    /// Forget level and trend state; thresholds are kept
    pub fn reset(&mut self) {
        self.level = PressureLevel::Normal;
        self.smoothed_mb = 0.0;
        self.peak_smoothed_mb = 0.0;
        self.level_since = None;
        self.recent_changes.clear();
        self.trend.reset();
    }
}

use crate::utils::stats::mean;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of the primary metric over the recent window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Increasing => "increasing",
            Self::Stable => "stable",
            Self::Decreasing => "decreasing",
        };
        f.write_str(s)
    }
}

/// Emitted only when the classified trend actually changes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendChange {
    pub from: Trend,
    pub to: Trend,
    pub rate: f64,
}

/// Classifies the recent growth rate of the primary metric.
///
/// The window is split into disjoint halves: older `[0, n/2)` and newer
/// `[n/2, n)`; `rate = (newAvg - oldAvg) / oldAvg`.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    window: usize,
    increasing_rate: f64,
    decreasing_rate: f64,
    current: Trend,
    last_rate: f64,
}

impl TrendAnalyzer {
    pub fn new(window: usize, increasing_rate: f64, decreasing_rate: f64) -> Self {
        Self {
            window: window.max(2),
            increasing_rate,
            decreasing_rate,
            current: Trend::Stable,
            last_rate: 0.0,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn current(&self) -> Trend {
        self.current
    }

    pub fn last_rate(&self) -> f64 {
        self.last_rate
    }

    /// Relative growth between the two halves of the most recent window
    pub fn growth_rate(&self, totals: &[f64]) -> f64 {
        let start = totals.len().saturating_sub(self.window);
        let recent = &totals[start..];
        if recent.len() < 2 {
            return 0.0;
        }

        let (older, newer) = recent.split_at(recent.len() / 2);
        let old_avg = mean(older);
        let new_avg = mean(newer);

        if old_avg == 0.0 {
            if new_avg == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            (new_avg - old_avg) / old_avg
        }
    }

    pub fn classify(&self, rate: f64) -> Trend {
        if rate > self.increasing_rate {
            Trend::Increasing
        } else if rate < self.decreasing_rate {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }

    /// Recompute the trend; returns a change only if the classification moved
    pub fn update(&mut self, totals: &[f64]) -> Option<TrendChange> {
        let rate = self.growth_rate(totals);
        let trend = self.classify(rate);
        self.last_rate = rate;

        if trend == self.current {
            return None;
        }

        let change = TrendChange {
            from: self.current,
            to: trend,
            rate,
        };
        self.current = trend;
        Some(change)
    }

    pub fn reset(&mut self) {
        self.current = Trend::Stable;
        self.last_rate = 0.0;
    }
}

//! Rate-limited alert dispatch
//!
//! An alert goes out only when the cooldown since the previous alert has
//! elapsed and fewer than `max_per_minute` alerts were issued in the
//! trailing 60 seconds. Suppressed requests are counted, never queued.

use crate::config::AlertConfig;
use crate::monitoring::patterns::Severity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

const RATE_WINDOW_SECS: i64 = 60;
const ISSUED_HISTORY: usize = 50;

/// What raised the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    LeakConfirmed,
    LeakEscalated,
    CriticalPressure,
    EmergencyMode,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LeakConfirmed => "leak confirmed",
            Self::LeakEscalated => "leak escalated",
            Self::CriticalPressure => "critical pressure",
            Self::EmergencyMode => "emergency mode",
        };
        f.write_str(s)
    }
}

/// Payload handed to [`AlertDispatcher::issue`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
}

impl AlertRequest {
    pub fn new(kind: AlertKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }
}

/// An alert that passed rate limiting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub issued: u64,
    pub suppressed_by_cooldown: u64,
    pub suppressed_by_rate: u64,
}

pub struct AlertDispatcher {
    cooldown: Duration,
    max_per_minute: usize,
    queue_size: usize,
    last_issued: Option<DateTime<Utc>>,
    /// Timestamps used only for the trailing-minute check
    recent: VecDeque<DateTime<Utc>>,
    issued: VecDeque<Alert>,
    stats: AlertStats,
}

impl AlertDispatcher {
    pub fn new(config: &AlertConfig) -> Self {
        let max_per_minute = config.max_per_minute.max(1);
        Self {
            cooldown: Duration::from_std(config.cooldown).unwrap_or_else(|_| Duration::seconds(60)),
            max_per_minute,
            queue_size: config.queue_size.max(max_per_minute),
            last_issued: None,
            recent: VecDeque::new(),
            issued: VecDeque::new(),
            stats: AlertStats::default(),
        }
    }

    /// Issue an alert if cooldown and the per-minute cap allow it
    pub fn issue(&mut self, request: AlertRequest, now: DateTime<Utc>) -> Option<Alert> {
        if let Some(last) = self.last_issued {
            if now - last < self.cooldown {
                self.stats.suppressed_by_cooldown += 1;
                debug!(kind = %request.kind, "Alert suppressed by cooldown");
                return None;
            }
        }

        let window_start = now - Duration::seconds(RATE_WINDOW_SECS);
        while self.recent.front().is_some_and(|&at| at <= window_start) {
            self.recent.pop_front();
        }
        if self.recent.len() >= self.max_per_minute {
            self.stats.suppressed_by_rate += 1;
            debug!(kind = %request.kind, "Alert suppressed by per-minute cap");
            return None;
        }

        if self.recent.len() >= self.queue_size {
            self.recent.pop_front();
        }
        self.recent.push_back(now);
        self.last_issued = Some(now);
        self.stats.issued += 1;

        let alert = Alert {
            id: Uuid::new_v4(),
            kind: request.kind,
            severity: request.severity,
            message: request.message,
            issued_at: now,
        };
        warn!(kind = %alert.kind, severity = %alert.severity, "ALERT: {}", alert.message);

        if self.issued.len() >= ISSUED_HISTORY {
            self.issued.pop_front();
        }
        self.issued.push_back(alert.clone());
        Some(alert)
    }

    pub fn stats(&self) -> AlertStats {
        self.stats
    }

    pub fn last_issued(&self) -> Option<DateTime<Utc>> {
        self.last_issued
    }

    /// Most recent issued alerts, oldest first
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.issued.iter().cloned().collect()
    }

    pub fn max_per_minute(&self) -> usize {
        self.max_per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(cooldown_secs: u64, cap: usize) -> AlertDispatcher {
        AlertDispatcher::new(&AlertConfig {
            cooldown: std::time::Duration::from_secs(cooldown_secs),
            max_per_minute: cap,
            ..AlertConfig::default()
        })
    }

    fn request() -> AlertRequest {
        AlertRequest::new(AlertKind::LeakConfirmed, Severity::High, "leak")
    }

    #[test]
    fn test_cooldown_blocks_even_under_cap() {
        let mut dispatcher = dispatcher(60, 3);
        let t0 = Utc::now();
        let issued = (0..4)
            .filter_map(|i| dispatcher.issue(request(), t0 + Duration::seconds(i * 10)))
            .count();

        assert_eq!(issued, 1);
        assert_eq!(dispatcher.stats().suppressed_by_cooldown, 3);
    }

    #[test]
    fn test_cap_applies_without_cooldown() {
        let mut dispatcher = dispatcher(0, 3);
        let t0 = Utc::now();
        let issued = (0..10)
            .filter_map(|i| dispatcher.issue(request(), t0 + Duration::seconds(i)))
            .count();
        assert_eq!(issued, 3);
        assert_eq!(dispatcher.stats().suppressed_by_rate, 7);

        // A full minute later the window has drained
        assert!(dispatcher
            .issue(request(), t0 + Duration::seconds(61))
            .is_some());
    }

    #[test]
    fn test_alert_carries_request() {
        let mut dispatcher = dispatcher(60, 3);
        let now = Utc::now();
        let alert = dispatcher
            .issue(
                AlertRequest::new(AlertKind::CriticalPressure, Severity::Critical, "hot"),
                now,
            )
            .unwrap();

        assert_eq!(alert.kind, AlertKind::CriticalPressure);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.issued_at, now);
        assert_eq!(dispatcher.recent_alerts().len(), 1);
    }
}

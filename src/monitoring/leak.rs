use crate::config::LeakConfig;
use crate::monitoring::alerting::{AlertKind, AlertRequest};
use crate::monitoring::patterns::{Pattern, Severity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

/// A leak-type pattern with its growth evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakRecord {
    pub pattern: Pattern,
    pub growth_rate_mb_per_min: f64,
    pub estimated_size_mb: f64,
    /// 0..=1, saturating with the number of corroborating history points
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationChange {
    pub confirmed: bool,
    pub findings_in_window: usize,
    pub at: DateTime<Utc>,
}

/// Result of one confirmation pass
#[derive(Debug, Clone, Default)]
pub struct ConfirmationOutcome {
    pub change: Option<ConfirmationChange>,
    /// At most one alert request per pass
    pub alert: Option<AlertRequest>,
    pub findings_in_window: usize,
}

/// Debounces transient leak findings into a standing confirmed state.
///
/// Findings older than the window are pruned before counting. Confirmation
/// holds while the in-window count stays at or above the threshold.
#[derive(Debug, Clone)]
pub struct LeakConfirmationEngine {
    window: Duration,
    threshold: usize,
    escalate_after: u32,
    max_records: usize,
    findings: VecDeque<DateTime<Utc>>,
    records: VecDeque<LeakRecord>,
    confirmed: bool,
    confirmed_since: Option<DateTime<Utc>>,
    consecutive: u32,
    total_findings: u64,
    confirmations: u64,
}

impl LeakConfirmationEngine {
    pub fn new(config: &LeakConfig, escalate_after: u32) -> Self {
        let window = Duration::from_std(config.window).unwrap_or_else(|_| Duration::seconds(180));
        Self {
            window,
            threshold: config.confirmation_threshold.max(1),
            escalate_after: escalate_after.max(1),
            max_records: config.max_records.max(1),
            findings: VecDeque::new(),
            records: VecDeque::new(),
            confirmed: false,
            confirmed_since: None,
            consecutive: 0,
            total_findings: 0,
            confirmations: 0,
        }
    }

    /// Fold one detection pass into the confirmation state.
    ///
    /// `leak` is the pass's leak finding, if any.
    pub fn evaluate(&mut self, leak: Option<&LeakRecord>, now: DateTime<Utc>) -> ConfirmationOutcome {
        if let Some(record) = leak {
            self.findings.push_back(now);
            self.total_findings += 1;
            if self.records.len() >= self.max_records {
                self.records.pop_front();
            }
            self.records.push_back(record.clone());
        }

        let cutoff = now - self.window;
        while self.findings.front().is_some_and(|&at| at < cutoff) {
            self.findings.pop_front();
        }

        let count = self.findings.len();
        let reached = count >= self.threshold;
        let mut outcome = ConfirmationOutcome {
            findings_in_window: count,
            ..Default::default()
        };

        if reached {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }

        if reached != self.confirmed {
            self.confirmed = reached;
            outcome.change = Some(ConfirmationChange {
                confirmed: reached,
                findings_in_window: count,
                at: now,
            });

            if reached {
                self.confirmed_since = Some(now);
                self.confirmations += 1;
                warn!(findings = count, "Memory leak confirmed");
                outcome.alert = Some(self.confirmation_alert(leak, count));
            } else {
                self.confirmed_since = None;
                info!(findings = count, "Memory leak confirmation cleared");
            }
        }

        if reached && self.consecutive == self.escalate_after && outcome.alert.is_none() {
            warn!(passes = self.consecutive, "Leak confirmed on consecutive passes, escalating");
            outcome.alert = Some(AlertRequest::new(
                AlertKind::LeakEscalated,
                Severity::Critical,
                format!(
                    "Leak confirmed for {} consecutive passes ({} findings in window)",
                    self.consecutive, count
                ),
            ));
        }

        outcome
    }

    fn confirmation_alert(&self, leak: Option<&LeakRecord>, count: usize) -> AlertRequest {
        let severity = if self.consecutive >= self.escalate_after {
            Severity::Critical
        } else {
            leak.map(|r| r.pattern.severity.max(Severity::Medium))
                .unwrap_or(Severity::Medium)
        };
        let detail = leak
            .map(|r| format!(", growing {:.2}MB/min", r.growth_rate_mb_per_min))
            .unwrap_or_default();

        AlertRequest::new(
            AlertKind::LeakConfirmed,
            severity,
            format!("Memory leak confirmed: {} findings in window{}", count, detail),
        )
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn confirmed_since(&self) -> Option<DateTime<Utc>> {
        self.confirmed_since
    }

    pub fn consecutive_confirmations(&self) -> u32 {
        self.consecutive
    }

    pub fn findings_in_window(&self) -> usize {
        self.findings.len()
    }

    pub fn total_findings(&self) -> u64 {
        self.total_findings
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn records(&self) -> Vec<LeakRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn latest_record(&self) -> Option<&LeakRecord> {
        self.records.back()
    }

    pub fn reset(&mut self) {
        self.findings.clear();
        self.records.clear();
        self.confirmed = false;
        self.confirmed_since = None;
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::patterns::PatternType;

    fn engine(threshold: usize, window_secs: u64) -> LeakConfirmationEngine {
        LeakConfirmationEngine::new(
            &LeakConfig {
                window: std::time::Duration::from_secs(window_secs),
                confirmation_threshold: threshold,
                ..LeakConfig::default()
            },
            3,
        )
    }

    fn record(now: DateTime<Utc>) -> LeakRecord {
        LeakRecord {
            pattern: Pattern::new(
                PatternType::Leak,
                Severity::High,
                "growing".to_string(),
                vec![],
                now,
            ),
            growth_rate_mb_per_min: 12.0,
            estimated_size_mb: 120.0,
            confidence: 0.5,
        }
    }

    #[test]
    fn test_confirms_at_threshold_and_clears_below() {
        let mut engine = engine(2, 180);
        let t0 = Utc::now();

        let first = engine.evaluate(Some(&record(t0)), t0);
        assert!(first.change.is_none());
        assert!(!engine.is_confirmed());

        let t1 = t0 + Duration::seconds(60);
        let second = engine.evaluate(Some(&record(t1)), t1);
        assert_eq!(second.change.map(|c| c.confirmed), Some(true));
        assert_eq!(second.alert.map(|a| a.kind), Some(AlertKind::LeakConfirmed));

        // Still at threshold: no flicker
        let t2 = t0 + Duration::seconds(120);
        let third = engine.evaluate(None, t2);
        assert!(third.change.is_none());
        assert!(engine.is_confirmed());

        // First finding ages out, count drops to 1
        let t3 = t0 + Duration::seconds(200);
        let fourth = engine.evaluate(None, t3);
        assert_eq!(fourth.change.map(|c| c.confirmed), Some(false));
        assert_eq!(engine.consecutive_confirmations(), 0);
    }

    #[test]
    fn test_escalates_once_after_consecutive_passes() {
        let mut engine = engine(1, 600);
        let t0 = Utc::now();

        let mut kinds = Vec::new();
        for i in 0..6 {
            let now = t0 + Duration::seconds(60 * i);
            if let Some(alert) = engine.evaluate(Some(&record(now)), now).alert {
                kinds.push((alert.kind, alert.severity));
            }
        }

        assert_eq!(
            kinds,
            vec![
                (AlertKind::LeakConfirmed, Severity::High),
                (AlertKind::LeakEscalated, Severity::Critical),
            ]
        );
        assert_eq!(engine.consecutive_confirmations(), 6);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut engine = engine(1, 60);
        let now = Utc::now();
        engine.evaluate(Some(&record(now)), now);
        assert!(engine.is_confirmed());

        engine.reset();
        assert!(!engine.is_confirmed());
        assert_eq!(engine.findings_in_window(), 0);
        assert!(engine.records().is_empty());
        assert_eq!(engine.total_findings(), 1);
    }
}

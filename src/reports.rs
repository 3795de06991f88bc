//! Read-only report aggregations
//!
//! Reports are assembled on demand from component state and never mutate
//! it. Each renders to markdown for humans and to JSON for tooling.

use crate::error::Result;
use crate::monitoring::alerting::{Alert, AlertStats};
use crate::monitoring::collector::CollectorStats;
use crate::monitoring::leak::{LeakConfirmationEngine, LeakRecord};
use crate::monitoring::patterns::{Pattern, PatternType};
use crate::monitoring::pressure::{LevelChange, PressureLevel, PressureStateMachine, PressureThresholds};
use crate::monitoring::snapshot::Snapshot;
use crate::monitoring::trend::Trend;
use crate::optimization::advisor::{Insight, Recommendation};
use crate::optimization::cleanup::{CleanupOperation, CleanupOrchestrator, CleanupRun};
use crate::optimization::emergency::{EmergencyMode, EmergencyState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

const RECENT_RUNS: usize = 10;

/// Failures swallowed at pass boundaries, by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounters {
    pub sampling: u64,
    pub analysis: u64,
    pub cleanup: u64,
}

impl FailureCounters {
    pub fn total(&self) -> u64 {
        self.sampling + self.analysis + self.cleanup
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakReport {
    pub generated_at: DateTime<Utc>,
    pub confirmed: bool,
    pub confirmed_since: Option<DateTime<Utc>>,
    pub findings_in_window: usize,
    pub confirmation_threshold: usize,
    pub window_secs: i64,
    pub consecutive_confirmations: u32,
    pub total_findings: u64,
    pub latest: Option<LeakRecord>,
    pub records: Vec<LeakRecord>,
}

impl LeakReport {
    pub fn from_engine(engine: &LeakConfirmationEngine, now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            confirmed: engine.is_confirmed(),
            confirmed_since: engine.confirmed_since(),
            findings_in_window: engine.findings_in_window(),
            confirmation_threshold: engine.threshold(),
            window_secs: engine.window().num_seconds(),
            consecutive_confirmations: engine.consecutive_confirmations(),
            total_findings: engine.total_findings(),
            latest: engine.latest_record().cloned(),
            records: engine.records(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Leak Report\n");
        let _ = writeln!(
            out,
            "- Status: **{}**",
            if self.confirmed { "CONFIRMED" } else { "not confirmed" }
        );
        if let Some(since) = self.confirmed_since {
            let _ = writeln!(out, "- Confirmed since: {}", since.to_rfc3339());
        }
        let _ = writeln!(
            out,
            "- Findings in window: {} / {} (window {}s)",
            self.findings_in_window, self.confirmation_threshold, self.window_secs
        );
        let _ = writeln!(out, "- Consecutive confirmed passes: {}", self.consecutive_confirmations);
        let _ = writeln!(out, "- Total leak findings: {}", self.total_findings);

        if let Some(latest) = &self.latest {
            let _ = writeln!(
                out,
                "- Latest: {:.2}MB/min, ~{:.1}MB, confidence {:.0}% ({})",
                latest.growth_rate_mb_per_min,
                latest.estimated_size_mb,
                latest.confidence * 100.0,
                latest.pattern.severity
            );
            if !latest.pattern.affected_components.is_empty() {
                let _ = writeln!(
                    out,
                    "- Suspected components: {}",
                    latest.pattern.affected_components.join(", ")
                );
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureReport {
    pub generated_at: DateTime<Utc>,
    pub level: PressureLevel,
    pub trend: Trend,
    /// `None` when growth starts from zero and the rate is unbounded
    pub trend_rate: Option<f64>,
    pub smoothed_mb: f64,
    pub peak_smoothed_mb: f64,
    pub thresholds: PressureThresholds,
    pub level_since: Option<DateTime<Utc>>,
    pub transitions: u64,
    pub recent_changes: Vec<LevelChange>,
    pub emergency: EmergencyState,
    pub emergency_threshold_mb: f64,
}

impl PressureReport {
    pub fn from_state(
        pressure: &PressureStateMachine,
        emergency: &EmergencyMode,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            generated_at: now,
            level: pressure.level(),
            trend: pressure.trend(),
            trend_rate: Some(pressure.trend_rate()).filter(|rate| rate.is_finite()),
            smoothed_mb: pressure.smoothed_mb(),
            peak_smoothed_mb: pressure.peak_smoothed_mb(),
            thresholds: pressure.thresholds(),
            level_since: pressure.level_since(),
            transitions: pressure.transitions(),
            recent_changes: pressure.recent_changes(),
            emergency: emergency.state(),
            emergency_threshold_mb: emergency.threshold_mb(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Pressure Report\n");
        let _ = writeln!(out, "- Level: **{}** ({:.1}MB smoothed)", self.level, self.smoothed_mb);
        match self.trend_rate {
            Some(rate) => {
                let _ = writeln!(out, "- Trend: {} ({:+.1}%)", self.trend, rate * 100.0);
            }
            None => {
                let _ = writeln!(out, "- Trend: {} (growing from zero)", self.trend);
            }
        }
        let _ = writeln!(out, "- Peak smoothed: {:.1}MB", self.peak_smoothed_mb);
        let _ = writeln!(
            out,
            "- Thresholds: low {:.0} / moderate {:.0} / high {:.0} / critical {:.0} MB",
            self.thresholds.low, self.thresholds.moderate, self.thresholds.high, self.thresholds.critical
        );
        let _ = writeln!(
            out,
            "- Emergency mode: {:?} (threshold {:.0}MB)",
            self.emergency, self.emergency_threshold_mb
        );
        let _ = writeln!(out, "- Level transitions: {}", self.transitions);

        if !self.recent_changes.is_empty() {
            let _ = writeln!(out, "\n| At | From | To | Smoothed MB |");
            let _ = writeln!(out, "|---|---|---|---|");
            for change in self.recent_changes.iter().rev().take(RECENT_RUNS) {
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {:.1} |",
                    change.at.format("%H:%M:%S"),
                    change.from,
                    change.to,
                    change.smoothed_mb
                );
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub current: Option<Snapshot>,
    pub history_len: usize,
    pub history_capacity: usize,
    pub collector: CollectorStats,
    pub patterns: Vec<Pattern>,
    pub pattern_counts: BTreeMap<PatternType, usize>,
    pub pressure: PressureReport,
    pub leak: LeakReport,
    pub alerts: AlertStats,
    pub recent_alerts: Vec<Alert>,
    pub failures: FailureCounters,
    pub insights: Vec<Insight>,
}

impl AnalysisReport {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Memory Analysis Report\n");
        let _ = writeln!(out, "Generated {}\n", self.generated_at.to_rfc3339());

        match &self.current {
            Some(current) => {
                let _ = writeln!(
                    out,
                    "- Current: {:.1}MB total ({:.1}MB managed, {:.1}MB unmanaged), {:.1} fps",
                    current.memory.total_mb,
                    current.memory.managed_mb,
                    current.memory.unmanaged_mb,
                    current.frame_rate
                );
            }
            None => {
                let _ = writeln!(out, "- Current: no samples yet");
            }
        }
        let _ = writeln!(
            out,
            "- History: {} / {} snapshots ({} collected, {} sampling failures)",
            self.history_len,
            self.history_capacity,
            self.collector.samples_collected,
            self.collector.sampling_failures
        );
        let _ = writeln!(
            out,
            "- Failures: {} sampling, {} analysis, {} cleanup",
            self.failures.sampling, self.failures.analysis, self.failures.cleanup
        );
        let _ = writeln!(
            out,
            "- Alerts: {} issued, {} suppressed by cooldown, {} by rate cap\n",
            self.alerts.issued, self.alerts.suppressed_by_cooldown, self.alerts.suppressed_by_rate
        );

        out.push_str(&self.pressure.to_markdown());
        out.push('\n');
        out.push_str(&self.leak.to_markdown());

        let _ = writeln!(out, "\n## Patterns\n");
        if self.pattern_counts.is_empty() {
            let _ = writeln!(out, "No patterns detected.");
        } else {
            for (pattern_type, count) in &self.pattern_counts {
                let _ = writeln!(out, "- {}: {}", pattern_type, count);
            }
            let _ = writeln!(out);
            for pattern in self.patterns.iter().rev().take(RECENT_RUNS) {
                let _ = writeln!(
                    out,
                    "- [{}] {}: {}",
                    pattern.severity, pattern.pattern_type, pattern.description
                );
            }
        }

        if !self.insights.is_empty() {
            let _ = writeln!(out, "\n## Insights\n");
            for insight in &self.insights {
                let _ = writeln!(out, "- {}", insight.message);
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_operations: u64,
    pub total_freed_mb: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub recent_runs: Vec<CleanupRun>,
}

impl CleanupSummary {
    pub fn from_orchestrator(orchestrator: &CleanupOrchestrator) -> Self {
        let history = orchestrator.history();
        let skip = history.len().saturating_sub(RECENT_RUNS);
        Self {
            total_runs: orchestrator.total_runs(),
            successful_runs: orchestrator.successful_runs(),
            failed_operations: orchestrator.failed_operations(),
            total_freed_mb: orchestrator.total_freed_mb(),
            last_run_at: orchestrator.last_run_at(),
            recent_runs: history.into_iter().skip(skip).collect(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successful_runs as f64 / self.total_runs as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencySummary {
    pub state: EmergencyState,
    pub activations: u64,
    pub activated_at: Option<DateTime<Utc>>,
    pub insufficient_attempts: u64,
    pub threshold_mb: f64,
    pub exit_level_mb: f64,
}

impl EmergencySummary {
    pub fn from_mode(mode: &EmergencyMode) -> Self {
        Self {
            state: mode.state(),
            activations: mode.activations(),
            activated_at: mode.activated_at(),
            insufficient_attempts: mode.insufficient_attempts(),
            threshold_mb: mode.threshold_mb(),
            exit_level_mb: mode.exit_level_mb(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub generated_at: DateTime<Utc>,
    pub recommendations: Vec<Recommendation>,
    pub cleanup: CleanupSummary,
    pub emergency: EmergencySummary,
    pub operations: Vec<CleanupOperation>,
}

impl OptimizationReport {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Optimization Report\n");
        let _ = writeln!(out, "Generated {}\n", self.generated_at.to_rfc3339());

        let _ = writeln!(out, "## Recommendations\n");
        if self.recommendations.is_empty() {
            let _ = writeln!(out, "No recommendations.");
        }
        for (i, rec) in self.recommendations.iter().enumerate() {
            let _ = writeln!(
                out,
                "### {}. {} (priority {}, {:?})\n",
                i + 1,
                rec.title,
                rec.priority,
                rec.status
            );
            let _ = writeln!(out, "{}\n", rec.description);
            let _ = writeln!(
                out,
                "- Category: {}, effort {:?}, risk {:?}, estimated benefit {:.0}MB",
                rec.category, rec.effort, rec.risk, rec.estimated_benefit_mb
            );
            if let Some(cb) = &rec.cost_benefit {
                let _ = writeln!(
                    out,
                    "- Cost/benefit: ~{:.0}h, {:.1}MB/h, payback score {:.1}",
                    cb.estimated_hours, cb.benefit_per_hour, cb.payback_score
                );
            }
            if let Some(guide) = &rec.implementation_guide {
                let _ = writeln!(out, "\n{}", guide);
            }
            if let Some(example) = &rec.example {
                let _ = writeln!(out, "\n```rust\n{}\n```", example);
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "## Cleanup\n");
        let _ = writeln!(
            out,
            "- Runs: {} ({:.0}% successful), {:.1}MB freed in total, {} failed operations",
            self.cleanup.total_runs,
            self.cleanup.success_rate() * 100.0,
            self.cleanup.total_freed_mb,
            self.cleanup.failed_operations
        );
        let _ = writeln!(
            out,
            "- Emergency mode: {:?}, {} activation(s), exits below {:.0}MB",
            self.emergency.state, self.emergency.activations, self.emergency.exit_level_mb
        );

        if !self.cleanup.recent_runs.is_empty() {
            let _ = writeln!(out, "\n| Started | Trigger | Level | Ops | Freed MB | Success |");
            let _ = writeln!(out, "|---|---|---|---|---|---|");
            for run in &self.cleanup.recent_runs {
                let _ = writeln!(
                    out,
                    "| {} | {:?} | {} | {} | {:.1} | {} |",
                    run.started_at.format("%H:%M:%S"),
                    run.trigger,
                    run.level,
                    run.results.len(),
                    run.total_freed_mb,
                    run.success
                );
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CleanupConfig, LeakConfig, PressureConfig};

    #[test]
    fn test_empty_reports_render() {
        let now = Utc::now();
        let leak = LeakReport::from_engine(&LeakConfirmationEngine::new(&LeakConfig::default(), 5), now);
        let pressure = PressureReport::from_state(
            &PressureStateMachine::new(&PressureConfig::default()),
            &EmergencyMode::new(&CleanupConfig::default()),
            now,
        );

        assert!(leak.to_markdown().contains("not confirmed"));
        assert!(pressure.to_markdown().contains("Level: **Normal**"));

        let json = pressure.to_json().unwrap();
        let parsed: PressureReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.level, PressureLevel::Normal);
    }

    #[test]
    fn test_unbounded_trend_rate_round_trips() {
        let mut pressure = PressureStateMachine::new(&PressureConfig::default());
        let now = Utc::now();
        pressure.analyze(&[0.0, 0.0, 0.0, 40.0, 40.0, 40.0], now);
        assert!(pressure.trend_rate().is_infinite());

        let report = PressureReport::from_state(
            &pressure,
            &EmergencyMode::new(&CleanupConfig::default()),
            now,
        );
        assert_eq!(report.trend_rate, None);
        assert!(report.to_markdown().contains("growing from zero"));

        let parsed: PressureReport = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_cleanup_summary_success_rate() {
        let summary = CleanupSummary {
            total_runs: 4,
            successful_runs: 3,
            failed_operations: 1,
            total_freed_mb: 12.0,
            last_run_at: None,
            recent_runs: Vec::new(),
        };
        assert_eq!(summary.success_rate(), 0.75);
        assert_eq!(FailureCounters { sampling: 1, analysis: 2, cleanup: 3 }.total(), 6);
    }
}

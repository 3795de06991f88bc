//! Pattern detection over snapshot history
//!
//! Every check is independent and runs over the same analysis window:
//! - Leak: sustained growth of the primary metric per minute
//! - Spike: repeated samples well above the window average
//! - Fragmentation: large unmanaged share of total memory
//! - FrequentCollection: collection events per minute above a ceiling
//! - Cyclic: a repeating period found by brute-force phase matching
//! - Correlation: other tracked series moving with the primary metric

use crate::config::PatternConfig;
use crate::monitoring::leak::LeakRecord;
use crate::monitoring::snapshot::Snapshot;
use crate::utils::stats::{mean, pearson};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PatternType {
    Leak,
    Spike,
    Fragmentation,
    FrequentCollection,
    Cyclic,
    Correlation,
}

impl PatternType {
    pub const ALL: [PatternType; 6] = [
        Self::Leak,
        Self::Spike,
        Self::Fragmentation,
        Self::FrequentCollection,
        Self::Cyclic,
        Self::Correlation,
    ];
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Leak => "leak",
            Self::Spike => "spike",
            Self::Fragmentation => "fragmentation",
            Self::FrequentCollection => "frequent collection",
            Self::Cyclic => "cyclic",
            Self::Correlation => "correlation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One detected anomalous usage shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub description: String,
    pub affected_components: Vec<String>,
    pub recommendations: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

impl Pattern {
    pub fn new(
        pattern_type: PatternType,
        severity: Severity,
        description: String,
        affected_components: Vec<String>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pattern_type,
            severity,
            description,
            affected_components,
            recommendations: canned_recommendations(pattern_type),
            detected_at,
        }
    }
}

/// Short remediation hints attached to every finding of a type
pub fn canned_recommendations(pattern_type: PatternType) -> Vec<String> {
    let hints: &[&str] = match pattern_type {
        PatternType::Leak => &[
            "Audit long-lived collections and caches for unbounded growth",
            "Check that event subscriptions are removed when owners are destroyed",
            "Compare object counts between snapshots to locate the growing category",
        ],
        PatternType::Spike => &[
            "Pre-allocate buffers used by bursty workloads",
            "Spread large loads across several frames",
        ],
        PatternType::Fragmentation => &[
            "Pool native buffers instead of allocating per use",
            "Release unused native resources and textures",
        ],
        PatternType::FrequentCollection => &[
            "Reduce per-frame temporary allocations",
            "Reuse collections and string builders on hot paths",
        ],
        PatternType::Cyclic => &[
            "Align cache expiry with the observed cycle",
            "Keep reusable objects alive across cycles instead of recreating them",
        ],
        PatternType::Correlation => &[
            "Inspect the correlated component for allocation on every update",
            "Bound the correlated component's internal storage",
        ],
    };
    hints.iter().map(|s| s.to_string()).collect()
}

/// Result of one detection pass
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    pub patterns: Vec<Pattern>,
    pub leak: Option<LeakRecord>,
}

/// Runs the pattern checks and retains a bounded list of findings
#[derive(Debug)]
pub struct PatternDetector {
    config: PatternConfig,
    retained: VecDeque<Pattern>,
    passes: u64,
    total_detected: u64,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            config,
            retained: VecDeque::new(),
            passes: 0,
            total_detected: 0,
        }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Run every check over the tail of `history`.
    ///
    /// Returns `None` until history holds `min_samples` snapshots.
    pub fn detect(&mut self, history: &[Snapshot], now: DateTime<Utc>) -> Option<DetectionOutcome> {
        if history.len() < self.config.min_samples.max(2) {
            return None;
        }

        let start = history.len().saturating_sub(self.config.analysis_window.max(2));
        let window = &history[start..];
        let totals: Vec<f64> = window.iter().map(Snapshot::total_mb).collect();

        let mut outcome = DetectionOutcome::default();

        if let Some(leak) = self.check_leak(window, now) {
            outcome.patterns.push(leak.pattern.clone());
            outcome.leak = Some(leak);
        }
        outcome.patterns.extend(self.check_spikes(&totals, now));
        outcome.patterns.extend(self.check_fragmentation(window, now));
        outcome.patterns.extend(self.check_frequent_collection(window, now));
        outcome.patterns.extend(self.check_cyclic(&totals, window, now));
        outcome.patterns.extend(self.check_correlations(&totals, window, now));

        self.passes += 1;
        self.total_detected += outcome.patterns.len() as u64;
        for pattern in &outcome.patterns {
            if self.retained.len() >= self.config.max_retained.max(1) {
                self.retained.pop_front();
            }
            self.retained.push_back(pattern.clone());
        }

        debug!(
            samples = window.len(),
            found = outcome.patterns.len(),
            "Pattern detection pass complete"
        );
        Some(outcome)
    }

    /// Severity of a leak finding from its growth rate relative to the threshold
    pub fn leak_severity(&self, growth_rate: f64) -> Severity {
        let ratio = growth_rate / self.config.leak_threshold_mb_per_min;
        if ratio >= 3.0 {
            Severity::Critical
        } else if ratio >= 2.0 {
            Severity::High
        } else if ratio >= 1.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn retained(&self) -> Vec<Pattern> {
        self.retained.iter().cloned().collect()
    }

    pub fn counts_by_type(&self) -> BTreeMap<PatternType, usize> {
        let mut counts = BTreeMap::new();
        for pattern in &self.retained {
            *counts.entry(pattern.pattern_type).or_insert(0) += 1;
        }
        counts
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn total_detected(&self) -> u64 {
        self.total_detected
    }

    pub fn clear(&mut self) {
        self.retained.clear();
    }

    fn check_leak(&self, window: &[Snapshot], now: DateTime<Utc>) -> Option<LeakRecord> {
        let first = window.first()?;
        let last = window.last()?;

        let elapsed_minutes = elapsed_minutes(first, last);
        if elapsed_minutes <= 0.0 {
            return None;
        }

        let growth = last.total_mb() - first.total_mb();
        let growth_rate = growth / elapsed_minutes;
        if growth_rate <= self.config.leak_threshold_mb_per_min {
            return None;
        }

        let severity = self.leak_severity(growth_rate);
        let affected = growing_categories(first, last);
        let description = format!(
            "Memory grew {:.1}MB over {:.1} minutes ({:.2}MB/min, threshold {:.2}MB/min)",
            growth, elapsed_minutes, growth_rate, self.config.leak_threshold_mb_per_min
        );

        let pattern = Pattern::new(PatternType::Leak, severity, description, affected, now);
        let saturation = self.config.confidence_saturation_points.max(1) as f64;

        Some(LeakRecord {
            pattern,
            growth_rate_mb_per_min: growth_rate,
            estimated_size_mb: growth,
            confidence: (window.len() as f64 / saturation).min(1.0),
        })
    }

    fn check_spikes(&self, totals: &[f64], now: DateTime<Utc>) -> Option<Pattern> {
        let average = mean(totals);
        if average <= 0.0 {
            return None;
        }

        let limit = average * self.config.spike_factor;
        let spikes: Vec<f64> = totals.iter().copied().filter(|&t| t > limit).collect();
        if spikes.len() < self.config.spike_min_count {
            return None;
        }

        let peak = spikes.iter().copied().fold(f64::MIN, f64::max);
        let severity = if spikes.len() * 2 >= totals.len() {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(Pattern::new(
            PatternType::Spike,
            severity,
            format!(
                "{} samples exceeded {:.1}x the window average of {:.1}MB (peak {:.1}MB)",
                spikes.len(),
                self.config.spike_factor,
                average,
                peak
            ),
            vec!["allocation bursts".to_string()],
            now,
        ))
    }

    fn check_fragmentation(&self, window: &[Snapshot], now: DateTime<Utc>) -> Option<Pattern> {
        let latest = window.last()?;
        let ratio = latest.memory.unmanaged_ratio();
        if ratio <= self.config.fragmentation_ratio {
            return None;
        }

        let severity = if ratio > 0.60 {
            Severity::High
        } else if ratio > 0.45 {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(Pattern::new(
            PatternType::Fragmentation,
            severity,
            format!(
                "Unmanaged memory is {:.0}% of total ({:.1}MB of {:.1}MB)",
                ratio * 100.0,
                latest.memory.unmanaged_mb,
                latest.memory.total_mb
            ),
            vec!["native heap".to_string()],
            now,
        ))
    }

    fn check_frequent_collection(&self, window: &[Snapshot], now: DateTime<Utc>) -> Option<Pattern> {
        let first = window.first()?;
        let last = window.last()?;

        let elapsed_minutes = elapsed_minutes(first, last);
        if elapsed_minutes <= 0.0 {
            return None;
        }

        let events = last.collection_count.saturating_sub(first.collection_count);
        let rate = events as f64 / elapsed_minutes;
        let limit = self.config.collection_rate_per_min;
        if rate <= limit {
            return None;
        }

        let severity = if rate > limit * 4.0 {
            Severity::High
        } else if rate > limit * 2.0 {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(Pattern::new(
            PatternType::FrequentCollection,
            severity,
            format!(
                "{} collections in {:.1} minutes ({:.1}/min, ceiling {:.1}/min)",
                events, elapsed_minutes, rate, limit
            ),
            vec!["garbage collector".to_string()],
            now,
        ))
    }

    fn check_cyclic(&self, totals: &[f64], window: &[Snapshot], now: DateTime<Utc>) -> Option<Pattern> {
        let tolerance = self.config.cyclic_tolerance_mb;
        let period = find_period(totals, self.config.cyclic_min_period, tolerance)?;

        let low = totals.iter().copied().fold(f64::MAX, f64::min);
        let high = totals.iter().copied().fold(f64::MIN, f64::max);
        let amplitude = high - low;

        let spacing_secs = match (window.first(), window.last()) {
            (Some(first), Some(last)) if window.len() > 1 => {
                (last.timestamp - first.timestamp).num_milliseconds() as f64
                    / 1000.0
                    / (window.len() - 1) as f64
            }
            _ => 0.0,
        };

        let severity = if amplitude > mean(totals) * 0.25 {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(Pattern::new(
            PatternType::Cyclic,
            severity,
            format!(
                "Usage repeats every {} samples (~{:.0}s) with {:.1}MB amplitude",
                period,
                period as f64 * spacing_secs,
                amplitude
            ),
            vec!["periodic workload".to_string()],
            now,
        ))
    }

    fn check_correlations(&self, totals: &[f64], window: &[Snapshot], now: DateTime<Utc>) -> Vec<Pattern> {
        let mut findings = Vec::new();

        for (name, series) in candidate_series(window) {
            let Some(r) = pearson(totals, &series) else {
                continue;
            };
            if r.abs() <= self.config.correlation_threshold {
                continue;
            }

            let severity = if r.abs() > 0.9 {
                Severity::Medium
            } else {
                Severity::Low
            };
            let direction = if r > 0.0 { "rises" } else { "falls" };

            findings.push(Pattern::new(
                PatternType::Correlation,
                severity,
                format!(
                    "'{}' {} with total memory (r = {:.2}, threshold {:.2})",
                    name, direction, r, self.config.correlation_threshold
                ),
                vec![name],
                now,
            ));
        }

        findings
    }
}

fn elapsed_minutes(first: &Snapshot, last: &Snapshot) -> f64 {
    (last.timestamp - first.timestamp).num_milliseconds() as f64 / 60_000.0
}

/// Object categories that grew between two snapshots, largest growth first
fn growing_categories(first: &Snapshot, last: &Snapshot) -> Vec<String> {
    let mut growth: Vec<(String, u64)> = last
        .object_counts
        .iter()
        .filter_map(|(name, &count)| {
            let before = first.object_counts.get(name).copied().unwrap_or(0);
            (count > before).then(|| (name.clone(), count - before))
        })
        .collect();
    growth.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut affected: Vec<String> = growth.into_iter().take(3).map(|(name, _)| name).collect();
    if affected.is_empty() {
        affected.push("managed heap".to_string());
    }
    affected
}

/// Smallest period in `[min_period, n/3]` where every sample matches its
/// same-phase predecessor within `tolerance`.
///
/// A window whose full range fits inside the tolerance is flat, not cyclic.
pub fn find_period(totals: &[f64], min_period: usize, tolerance: f64) -> Option<usize> {
    let n = totals.len();
    let max_period = n / 3;
    let min_period = min_period.max(1);
    if max_period < min_period {
        return None;
    }

    let low = totals.iter().copied().fold(f64::MAX, f64::min);
    let high = totals.iter().copied().fold(f64::MIN, f64::max);
    if high - low <= tolerance {
        return None;
    }

    (min_period..=max_period).find(|&period| {
        (period..n).all(|i| (totals[i] - totals[i - period]).abs() <= tolerance)
    })
}

/// Series eligible for correlation: frame rate plus every object and type
/// count present in all snapshots. Memory components are excluded since
/// they sum to the primary metric.
fn candidate_series(window: &[Snapshot]) -> Vec<(String, Vec<f64>)> {
    let mut series = vec![(
        "frame_rate".to_string(),
        window.iter().map(|s| s.frame_rate).collect::<Vec<f64>>(),
    )];

    let Some(first) = window.first() else {
        return series;
    };

    for key in first.object_counts.keys() {
        let values: Option<Vec<f64>> = window
            .iter()
            .map(|s| s.object_counts.get(key).map(|&c| c as f64))
            .collect();
        if let Some(values) = values {
            series.push((format!("objects:{}", key), values));
        }
    }

    for key in first.type_counts.keys() {
        let values: Option<Vec<f64>> = window
            .iter()
            .map(|s| s.type_counts.get(key).map(|&c| c as f64))
            .collect();
        if let Some(values) = values {
            series.push((format!("type:{}", key), values));
        }
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::snapshot::MemoryUsage;
    use chrono::Duration;

    fn series(totals: &[f64], step_secs: i64) -> Vec<Snapshot> {
        let start = Utc::now();
        totals
            .iter()
            .enumerate()
            .map(|(i, &total)| {
                Snapshot::new(
                    start + Duration::seconds(step_secs * i as i64),
                    MemoryUsage::new(total, total * 0.9, total * 0.1),
                )
                .with_frame_rate(60.0)
            })
            .collect()
    }

    fn detector() -> PatternDetector {
        PatternDetector::new(PatternConfig {
            min_samples: 5,
            ..PatternConfig::default()
        })
    }

    fn of_type(outcome: &DetectionOutcome, pattern_type: PatternType) -> Vec<&Pattern> {
        outcome
            .patterns
            .iter()
            .filter(|p| p.pattern_type == pattern_type)
            .collect()
    }

    #[test]
    fn test_needs_min_samples() {
        let mut detector = detector();
        let history = series(&[100.0, 200.0, 300.0], 60);
        assert!(detector.detect(&history, Utc::now()).is_none());
        assert_eq!(detector.passes(), 0);
    }

    #[test]
    fn test_leak_severity_scales_with_ratio() {
        let detector = detector();
        assert_eq!(detector.leak_severity(5.0), Severity::Medium);
        assert_eq!(detector.leak_severity(10.0), Severity::High);
        assert_eq!(detector.leak_severity(15.0), Severity::Critical);
        assert_eq!(detector.leak_severity(2.0), Severity::Low);
    }

    #[test]
    fn test_leak_detected_with_record() {
        let mut detector = detector();
        // 8MB/min against the 5MB/min default threshold
        let totals: Vec<f64> = (0..10).map(|i| 100.0 + 8.0 * i as f64).collect();
        let outcome = detector.detect(&series(&totals, 60), Utc::now()).unwrap();

        let leak = outcome.leak.as_ref().expect("leak record");
        assert!((leak.growth_rate_mb_per_min - 8.0).abs() < 1e-9);
        assert!((leak.estimated_size_mb - 72.0).abs() < 1e-9);
        assert_eq!(leak.pattern.severity, Severity::Medium);
        assert_eq!(of_type(&outcome, PatternType::Leak).len(), 1);
        assert!(leak.confidence > 0.0 && leak.confidence <= 1.0);
    }

    #[test]
    fn test_no_leak_when_flat() {
        let mut detector = detector();
        let outcome = detector.detect(&series(&[100.0; 10], 60), Utc::now()).unwrap();
        assert!(outcome.leak.is_none());
    }

    #[test]
    fn test_spike_needs_three_samples() {
        let mut detector = detector();
        let two = [100.0, 100.0, 400.0, 100.0, 100.0, 400.0, 100.0, 100.0, 100.0, 100.0];
        let outcome = detector.detect(&series(&two, 1), Utc::now()).unwrap();
        assert!(of_type(&outcome, PatternType::Spike).is_empty());

        let three = [100.0, 100.0, 400.0, 100.0, 100.0, 400.0, 100.0, 400.0, 100.0, 100.0];
        let outcome = detector.detect(&series(&three, 1), Utc::now()).unwrap();
        assert_eq!(of_type(&outcome, PatternType::Spike).len(), 1);
    }

    #[test]
    fn test_fragmentation_threshold() {
        let mut detector = detector();
        let mut history = series(&[100.0; 6], 60);
        let last = history.len() - 1;
        history[last].memory = MemoryUsage::new(100.0, 50.0, 50.0);

        let outcome = detector.detect(&history, Utc::now()).unwrap();
        let found = of_type(&outcome, PatternType::Fragmentation);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Medium);
    }

    #[test]
    fn test_frequent_collection_rate() {
        let mut detector = detector();
        let mut history = series(&[100.0; 6], 60);
        // 60 collections over 5 minutes = 12/min
        for (i, snapshot) in history.iter_mut().enumerate() {
            snapshot.collection_count = 12 * i as u64;
        }

        let outcome = detector.detect(&history, Utc::now()).unwrap();
        let found = of_type(&outcome, PatternType::FrequentCollection);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Medium);
    }

    #[test]
    fn test_find_period() {
        let wave: Vec<f64> = (0..30).map(|i| if i % 6 < 3 { 100.0 } else { 150.0 }).collect();
        assert_eq!(find_period(&wave, 5, 5.0), Some(6));
        // Flat series is not cyclic
        assert_eq!(find_period(&[100.0; 30], 5, 5.0), None);
        // Too short for any candidate period
        assert_eq!(find_period(&wave[..12], 5, 5.0), None);
    }

    #[test]
    fn test_correlated_object_count() {
        let mut detector = detector();
        let totals: Vec<f64> = (0..10).map(|i| 100.0 + (i % 4) as f64 * 3.0).collect();
        let history: Vec<Snapshot> = series(&totals, 60)
            .into_iter()
            .map(|s| {
                let mut counts = BTreeMap::new();
                counts.insert("entities".to_string(), (s.total_mb() * 10.0) as u64);
                s.with_object_counts(counts)
            })
            .collect();

        let outcome = detector.detect(&history, Utc::now()).unwrap();
        let found = of_type(&outcome, PatternType::Correlation);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].affected_components, vec!["objects:entities".to_string()]);
    }

    #[test]
    fn test_retained_list_is_bounded_and_clearable() {
        let mut detector = PatternDetector::new(PatternConfig {
            min_samples: 5,
            max_retained: 2,
            ..PatternConfig::default()
        });
        let totals: Vec<f64> = (0..10).map(|i| 100.0 + 20.0 * i as f64).collect();
        let history = series(&totals, 60);
        for _ in 0..3 {
            detector.detect(&history, Utc::now());
        }

        assert_eq!(detector.retained().len(), 2);
        detector.clear();
        assert!(detector.retained().is_empty());
        assert!(detector.total_detected() >= 3);
    }
}

//! Rule-based optimization advice
//!
//! Every pass evaluates each rule's predicate against an [`AdvisorContext`]
//! and replaces the recommendation set wholesale with the rules that fired,
//! sorted and truncated to `max_recommendations`.

use crate::config::AdvisorConfig;
use crate::error::{Error, Result};
use crate::monitoring::patterns::PatternType;
use crate::monitoring::pressure::PressureLevel;
use crate::monitoring::trend::Trend;
use crate::optimization::templates::{cost_benefit, template_for};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdvisorCategory {
    Allocation,
    GarbageCollection,
    ResourceManagement,
    CodePatterns,
}

impl fmt::Display for AdvisorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Effort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecommendationStatus {
    Pending,
    Accepted,
    Rejected,
    Implemented,
}

impl RecommendationStatus {
    pub fn can_transition_to(self, next: RecommendationStatus) -> bool {
        use RecommendationStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted) | (Pending, Rejected) | (Accepted, Implemented)
        )
    }
}

/// Ordering applied after each pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSort {
    /// Priority descending, then estimated benefit descending
    #[default]
    PriorityThenBenefit,
    /// Estimated benefit descending, then effort ascending
    BenefitThenEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBenefit {
    pub estimated_hours: f64,
    pub benefit_per_hour: f64,
    pub payback_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub rule: String,
    pub category: AdvisorCategory,
    pub priority: u8,
    pub title: String,
    pub description: String,
    pub estimated_benefit_mb: f64,
    pub effort: Effort,
    pub risk: Risk,
    pub status: RecommendationStatus,
    pub implementation_guide: Option<String>,
    pub example: Option<String>,
    pub cost_benefit: Option<CostBenefit>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated state the rules are evaluated against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisorContext {
    pub current_mb: f64,
    pub managed_mb: f64,
    pub unmanaged_mb: f64,
    pub frame_rate: f64,
    pub pressure_level: PressureLevel,
    pub trend: Option<Trend>,
    pub trend_rate: f64,
    pub leak_confirmed: bool,
    pub leak_findings_in_window: usize,
    pub leak_growth_rate_mb_per_min: Option<f64>,
    pub pattern_counts: BTreeMap<PatternType, usize>,
    pub object_counts: BTreeMap<String, u64>,
    pub cleanup_runs: u64,
    pub cleanup_success_rate: f64,
    pub average_freed_mb: f64,
    pub emergency_active: bool,
    pub emergency_activations: u64,
    /// Change of the primary metric across the whole history
    pub history_growth_mb: f64,
    pub history_span_minutes: f64,
}

impl AdvisorContext {
    pub fn patterns_of(&self, pattern_type: PatternType) -> usize {
        self.pattern_counts.get(&pattern_type).copied().unwrap_or(0)
    }

    pub fn unmanaged_ratio(&self) -> f64 {
        if self.current_mb > 0.0 {
            self.unmanaged_mb / self.current_mb
        } else {
            0.0
        }
    }

    pub fn largest_object_category(&self) -> Option<(&str, u64)> {
        self.object_counts
            .iter()
            .max_by_key(|(_, &count)| count)
            .map(|(name, &count)| (name.as_str(), count))
    }
}

/// A condition/action rule
#[derive(Clone)]
pub struct AdvisorRule {
    pub name: &'static str,
    pub category: AdvisorCategory,
    pub priority: u8,
    pub estimated_benefit_mb: f64,
    pub effort: Effort,
    pub risk: Risk,
    pub title: &'static str,
    pub predicate: fn(&AdvisorContext) -> bool,
    pub describe: fn(&AdvisorContext) -> String,
}

impl fmt::Debug for AdvisorRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorRule")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("priority", &self.priority)
            .finish()
    }
}

impl AdvisorRule {
    fn synthesize(&self, ctx: &AdvisorContext, now: DateTime<Utc>) -> Recommendation {
        let template = template_for(self.name);
        Recommendation {
            id: Uuid::new_v4(),
            rule: self.name.to_string(),
            category: self.category,
            priority: self.priority,
            title: self.title.to_string(),
            description: (self.describe)(ctx),
            estimated_benefit_mb: self.estimated_benefit_mb,
            effort: self.effort,
            risk: self.risk,
            status: RecommendationStatus::Pending,
            implementation_guide: template.map(|t| t.guide.to_string()),
            example: template.map(|t| t.example.to_string()),
            cost_benefit: Some(cost_benefit(self.effort, self.risk, self.estimated_benefit_mb)),
            created_at: now,
        }
    }
}

/// The thirteen built-in rules
pub fn builtin_rules() -> Vec<AdvisorRule> {
    vec![
        AdvisorRule {
            name: "reduce_allocation_rate",
            category: AdvisorCategory::Allocation,
            priority: 8,
            estimated_benefit_mb: 100.0,
            effort: Effort::Medium,
            risk: Risk::Low,
            title: "Reduce allocation rate",
            predicate: |c| c.trend == Some(Trend::Increasing) && c.pressure_level >= PressureLevel::Moderate,
            describe: |c| {
                format!(
                    "Memory is rising ({:+.1}% over the trend window) at {} pressure",
                    c.trend_rate * 100.0,
                    c.pressure_level
                )
            },
        },
        AdvisorRule {
            name: "preallocate_buffers",
            category: AdvisorCategory::Allocation,
            priority: 5,
            estimated_benefit_mb: 30.0,
            effort: Effort::Low,
            risk: Risk::Low,
            title: "Pre-allocate buffers for bursty work",
            predicate: |c| c.patterns_of(PatternType::Spike) > 0,
            describe: |c| format!("{} spike findings in retained patterns", c.patterns_of(PatternType::Spike)),
        },
        AdvisorRule {
            name: "reduce_native_allocations",
            category: AdvisorCategory::Allocation,
            priority: 6,
            estimated_benefit_mb: 60.0,
            effort: Effort::Medium,
            risk: Risk::Medium,
            title: "Reduce unmanaged allocations",
            predicate: |c| c.patterns_of(PatternType::Fragmentation) > 0 || c.unmanaged_ratio() > 0.30,
            describe: |c| {
                format!(
                    "Unmanaged memory is {:.0}% of the {:.1}MB total",
                    c.unmanaged_ratio() * 100.0,
                    c.current_mb
                )
            },
        },
        AdvisorRule {
            name: "cap_object_counts",
            category: AdvisorCategory::Allocation,
            priority: 4,
            estimated_benefit_mb: 25.0,
            effort: Effort::Low,
            risk: Risk::Low,
            title: "Bound live object counts",
            predicate: |c| c.largest_object_category().is_some_and(|(_, count)| count > 10_000),
            describe: |c| match c.largest_object_category() {
                Some((name, count)) => format!("'{}' holds {} live objects", name, count),
                None => "No object counts available".to_string(),
            },
        },
        AdvisorRule {
            name: "reduce_collection_pressure",
            category: AdvisorCategory::GarbageCollection,
            priority: 7,
            estimated_benefit_mb: 40.0,
            effort: Effort::Medium,
            risk: Risk::Low,
            title: "Reduce garbage collection frequency",
            predicate: |c| c.patterns_of(PatternType::FrequentCollection) > 0,
            describe: |c| {
                format!(
                    "{} frequent-collection findings; short-lived garbage dominates",
                    c.patterns_of(PatternType::FrequentCollection)
                )
            },
        },
        AdvisorRule {
            name: "schedule_incremental_collection",
            category: AdvisorCategory::GarbageCollection,
            priority: 6,
            estimated_benefit_mb: 50.0,
            effort: Effort::Medium,
            risk: Risk::Medium,
            title: "Collect incrementally during idle time",
            predicate: |c| c.pressure_level >= PressureLevel::High,
            describe: |c| format!("Pressure is {} at {:.1}MB", c.pressure_level, c.current_mb),
        },
        AdvisorRule {
            name: "align_collection_with_cycles",
            category: AdvisorCategory::GarbageCollection,
            priority: 3,
            estimated_benefit_mb: 20.0,
            effort: Effort::Low,
            risk: Risk::Low,
            title: "Align cleanup with the usage cycle",
            predicate: |c| c.patterns_of(PatternType::Cyclic) > 0,
            describe: |c| format!("{} cyclic findings in retained patterns", c.patterns_of(PatternType::Cyclic)),
        },
        AdvisorRule {
            name: "fix_confirmed_leak",
            category: AdvisorCategory::ResourceManagement,
            priority: 10,
            estimated_benefit_mb: 200.0,
            effort: Effort::High,
            risk: Risk::Medium,
            title: "Fix the confirmed memory leak",
            predicate: |c| c.leak_confirmed,
            describe: |c| match c.leak_growth_rate_mb_per_min {
                Some(rate) => format!("Leak confirmed, growing {:.2}MB/min", rate),
                None => "Leak confirmed".to_string(),
            },
        },
        AdvisorRule {
            name: "unload_idle_resources",
            category: AdvisorCategory::ResourceManagement,
            priority: 6,
            estimated_benefit_mb: 80.0,
            effort: Effort::Medium,
            risk: Risk::Low,
            title: "Unload idle resources proactively",
            predicate: |c| {
                c.pressure_level >= PressureLevel::Moderate
                    && c.cleanup_runs > 0
                    && c.cleanup_success_rate < 0.5
            },
            describe: |c| {
                format!(
                    "Only {:.0}% of {} cleanup runs succeeded at {} pressure",
                    c.cleanup_success_rate * 100.0,
                    c.cleanup_runs,
                    c.pressure_level
                )
            },
        },
        AdvisorRule {
            name: "raise_memory_budget",
            category: AdvisorCategory::ResourceManagement,
            priority: 9,
            estimated_benefit_mb: 150.0,
            effort: Effort::High,
            risk: Risk::High,
            title: "Revisit the memory budget",
            predicate: |c| c.emergency_activations > 0,
            describe: |c| {
                format!(
                    "Emergency mode entered {} time(s){}",
                    c.emergency_activations,
                    if c.emergency_active { ", still active" } else { "" }
                )
            },
        },
        AdvisorRule {
            name: "improve_cleanup_effectiveness",
            category: AdvisorCategory::ResourceManagement,
            priority: 4,
            estimated_benefit_mb: 15.0,
            effort: Effort::Low,
            risk: Risk::Low,
            title: "Make cleanup operations effective",
            predicate: |c| c.cleanup_runs >= 3 && c.average_freed_mb < 1.0,
            describe: |c| {
                format!(
                    "{} cleanup runs freed {:.2}MB on average",
                    c.cleanup_runs, c.average_freed_mb
                )
            },
        },
        AdvisorRule {
            name: "audit_event_subscriptions",
            category: AdvisorCategory::CodePatterns,
            priority: 5,
            estimated_benefit_mb: 35.0,
            effort: Effort::Medium,
            risk: Risk::Low,
            title: "Audit event subscriptions",
            predicate: |c| c.leak_findings_in_window > 0 && !c.leak_confirmed,
            describe: |c| {
                format!(
                    "{} unconfirmed leak finding(s) in the confirmation window",
                    c.leak_findings_in_window
                )
            },
        },
        AdvisorRule {
            name: "decouple_memory_from_frame_rate",
            category: AdvisorCategory::CodePatterns,
            priority: 5,
            estimated_benefit_mb: 20.0,
            effort: Effort::Medium,
            risk: Risk::Medium,
            title: "Decouple memory from per-frame work",
            predicate: |c| c.patterns_of(PatternType::Correlation) > 0 && c.frame_rate > 0.0 && c.frame_rate < 30.0,
            describe: |c| format!("Frame rate is {:.1} while memory tracks a component", c.frame_rate),
        },
    ]
}

/// Category of a derived insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsightKind {
    Growth,
    DominantPattern,
    CleanupEffectiveness,
    FrameRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
    pub generated_at: DateTime<Utc>,
}

/// Short textual observations derived from the context
pub fn derive_insights(ctx: &AdvisorContext, now: DateTime<Utc>) -> Vec<Insight> {
    let mut insights = Vec::new();
    let mut push = |kind, message: String| {
        insights.push(Insight {
            kind,
            message,
            generated_at: now,
        })
    };

    if ctx.history_span_minutes > 0.0 && ctx.history_growth_mb.abs() >= 1.0 {
        push(
            InsightKind::Growth,
            format!(
                "Memory {} {:.1}MB over the last {:.1} minutes",
                if ctx.history_growth_mb > 0.0 { "grew" } else { "shrank" },
                ctx.history_growth_mb.abs(),
                ctx.history_span_minutes
            ),
        );
    }

    if let Some((pattern_type, count)) = ctx
        .pattern_counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
    {
        if *count > 0 {
            push(
                InsightKind::DominantPattern,
                format!("Most frequent pattern: {} ({} findings)", pattern_type, count),
            );
        }
    }

    if ctx.cleanup_runs > 0 {
        push(
            InsightKind::CleanupEffectiveness,
            format!(
                "Cleanup succeeded in {:.0}% of {} runs, freeing {:.1}MB on average",
                ctx.cleanup_success_rate * 100.0,
                ctx.cleanup_runs,
                ctx.average_freed_mb
            ),
        );
    }

    if ctx.pressure_level >= PressureLevel::High && ctx.frame_rate > 0.0 && ctx.frame_rate < 30.0 {
        push(
            InsightKind::FrameRate,
            format!(
                "Frame rate dropped to {:.1} under {} pressure",
                ctx.frame_rate, ctx.pressure_level
            ),
        );
    }

    insights
}

pub struct AdvisorEngine {
    rules: Vec<AdvisorRule>,
    max_recommendations: usize,
    sort: RecommendationSort,
    max_insights: usize,
    recommendations: Vec<Recommendation>,
    insights: VecDeque<Insight>,
    passes: u64,
    last_pass_at: Option<DateTime<Utc>>,
}

impl AdvisorEngine {
    pub fn new(config: &AdvisorConfig) -> Self {
        Self::with_rules(config, builtin_rules())
    }

    pub fn with_rules(config: &AdvisorConfig, rules: Vec<AdvisorRule>) -> Self {
        Self {
            rules,
            max_recommendations: config.max_recommendations.max(1),
            sort: config.sort,
            max_insights: config.max_insights.max(1),
            recommendations: Vec::new(),
            insights: VecDeque::new(),
            passes: 0,
            last_pass_at: None,
        }
    }

    /// Register an extra rule; names must be unique across the table
    pub fn add_rule(&mut self, rule: AdvisorRule) -> Result<()> {
        if self.rules.iter().any(|existing| existing.name == rule.name) {
            return Err(Error::Config(format!(
                "Advisor rule '{}' already registered",
                rule.name
            )));
        }
        debug!(name = rule.name, category = ?rule.category, "Registered advisor rule");
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[AdvisorRule] {
        &self.rules
    }

    /// Evaluate every rule and replace the recommendation set
    pub fn evaluate(&mut self, ctx: &AdvisorContext, now: DateTime<Utc>) -> &[Recommendation] {
        let mut fired: Vec<Recommendation> = self
            .rules
            .iter()
            .filter(|rule| (rule.predicate)(ctx))
            .map(|rule| rule.synthesize(ctx, now))
            .collect();

        sort_recommendations(&mut fired, self.sort);
        fired.truncate(self.max_recommendations);

        debug!(fired = fired.len(), rules = self.rules.len(), "Advisory pass complete");
        self.recommendations = fired;
        self.passes += 1;
        self.last_pass_at = Some(now);
        &self.recommendations
    }

    /// Derive insights and retain the ones not already seen; returns the new ones
    pub fn refresh_insights(&mut self, ctx: &AdvisorContext, now: DateTime<Utc>) -> Vec<Insight> {
        let mut fresh = Vec::new();
        for insight in derive_insights(ctx, now) {
            let seen = self
                .insights
                .iter()
                .any(|i| i.kind == insight.kind && i.message == insight.message);
            if seen {
                continue;
            }
            if self.insights.len() >= self.max_insights {
                self.insights.pop_front();
            }
            self.insights.push_back(insight.clone());
            fresh.push(insight);
        }
        fresh
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.recommendations
    }

    pub fn insights(&self) -> Vec<Insight> {
        self.insights.iter().cloned().collect()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn last_pass_at(&self) -> Option<DateTime<Utc>> {
        self.last_pass_at
    }

    pub fn set_status(&mut self, id: Uuid, status: RecommendationStatus) -> Result<()> {
        let recommendation = self
            .recommendations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("Recommendation {}", id)))?;

        if !recommendation.status.can_transition_to(status) {
            return Err(Error::InvalidState(format!(
                "Cannot move recommendation from {:?} to {:?}",
                recommendation.status, status
            )));
        }
        recommendation.status = status;
        Ok(())
    }
}

fn compare(a: &Recommendation, b: &Recommendation, sort: RecommendationSort) -> Ordering {
    let by_benefit = b
        .estimated_benefit_mb
        .partial_cmp(&a.estimated_benefit_mb)
        .unwrap_or(Ordering::Equal);

    let primary = match sort {
        RecommendationSort::PriorityThenBenefit => b.priority.cmp(&a.priority).then(by_benefit),
        RecommendationSort::BenefitThenEffort => by_benefit.then(a.effort.cmp(&b.effort)),
    };
    primary.then_with(|| a.rule.cmp(&b.rule))
}

pub fn sort_recommendations(recommendations: &mut [Recommendation], sort: RecommendationSort) {
    recommendations.sort_by(|a, b| compare(a, b, sort));
}

/// Whether a list is ordered per `sort`
pub fn is_sorted(recommendations: &[Recommendation], sort: RecommendationSort) -> bool {
    recommendations
        .windows(2)
        .all(|pair| compare(&pair[0], &pair[1], sort) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, sort: RecommendationSort) -> AdvisorConfig {
        AdvisorConfig {
            max_recommendations: max,
            sort,
            ..AdvisorConfig::default()
        }
    }

    fn stressed() -> AdvisorContext {
        let mut pattern_counts = BTreeMap::new();
        pattern_counts.insert(PatternType::Spike, 2);
        pattern_counts.insert(PatternType::FrequentCollection, 1);
        pattern_counts.insert(PatternType::Cyclic, 1);

        AdvisorContext {
            current_mb: 1800.0,
            managed_mb: 1000.0,
            unmanaged_mb: 800.0,
            frame_rate: 24.0,
            pressure_level: PressureLevel::High,
            trend: Some(Trend::Increasing),
            trend_rate: 0.2,
            leak_confirmed: true,
            leak_growth_rate_mb_per_min: Some(12.0),
            pattern_counts,
            emergency_activations: 1,
            ..AdvisorContext::default()
        }
    }

    #[test]
    fn test_thirteen_rules_in_four_categories() {
        let rules = builtin_rules();
        assert_eq!(rules.len(), 13);
        for category in [
            AdvisorCategory::Allocation,
            AdvisorCategory::GarbageCollection,
            AdvisorCategory::ResourceManagement,
            AdvisorCategory::CodePatterns,
        ] {
            assert!(rules.iter().any(|r| r.category == category));
        }
        for rule in &rules {
            assert!(template_for(rule.name).is_some(), "{} has no template", rule.name);
        }
    }

    #[test]
    fn test_quiet_context_fires_nothing() {
        let mut engine = AdvisorEngine::new(&AdvisorConfig::default());
        assert!(engine.evaluate(&AdvisorContext::default(), Utc::now()).is_empty());
    }

    #[test]
    fn test_truncated_and_sorted_by_priority() {
        let mut engine = AdvisorEngine::new(&config(3, RecommendationSort::PriorityThenBenefit));
        let recs = engine.evaluate(&stressed(), Utc::now()).to_vec();

        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].rule, "fix_confirmed_leak");
        assert_eq!(recs[1].rule, "raise_memory_budget");
        assert!(is_sorted(&recs, RecommendationSort::PriorityThenBenefit));
        assert!(recs.iter().all(|r| r.implementation_guide.is_some()));
    }

    #[test]
    fn test_benefit_then_effort_ordering() {
        let mut engine = AdvisorEngine::new(&config(20, RecommendationSort::BenefitThenEffort));
        let recs = engine.evaluate(&stressed(), Utc::now()).to_vec();
        assert!(is_sorted(&recs, RecommendationSort::BenefitThenEffort));
        assert_eq!(recs[0].rule, "fix_confirmed_leak");
    }

    #[test]
    fn test_rerun_replaces_set() {
        let mut engine = AdvisorEngine::new(&AdvisorConfig::default());
        let first: Vec<Uuid> = engine.evaluate(&stressed(), Utc::now()).iter().map(|r| r.id).collect();
        let second: Vec<Uuid> = engine.evaluate(&stressed(), Utc::now()).iter().map(|r| r.id).collect();

        assert_eq!(first.len(), second.len());
        assert!(first.iter().all(|id| !second.contains(id)));

        let rules: Vec<String> = engine.recommendations().iter().map(|r| r.rule.clone()).collect();
        let mut deduped = rules.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), rules.len());
    }

    #[test]
    fn test_status_transitions() {
        let mut engine = AdvisorEngine::new(&AdvisorConfig::default());
        let id = engine.evaluate(&stressed(), Utc::now())[0].id;

        assert!(matches!(
            engine.set_status(id, RecommendationStatus::Implemented),
            Err(Error::InvalidState(_))
        ));
        engine.set_status(id, RecommendationStatus::Accepted).unwrap();
        engine.set_status(id, RecommendationStatus::Implemented).unwrap();
        assert!(matches!(
            engine.set_status(Uuid::new_v4(), RecommendationStatus::Accepted),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_insights_deduplicated() {
        let mut engine = AdvisorEngine::new(&AdvisorConfig::default());
        let ctx = AdvisorContext {
            history_growth_mb: 40.0,
            history_span_minutes: 5.0,
            ..stressed()
        };

        let first = engine.refresh_insights(&ctx, Utc::now());
        assert!(first.iter().any(|i| i.kind == InsightKind::Growth));
        assert!(first.iter().any(|i| i.kind == InsightKind::FrameRate));
        assert!(engine.refresh_insights(&ctx, Utc::now()).is_empty());
        assert_eq!(engine.insights().len(), first.len());
    }

    #[test]
    fn test_duplicate_rule_names_rejected() {
        let mut engine = AdvisorEngine::new(&AdvisorConfig::default());
        let before = engine.rules().len();
        let duplicate = builtin_rules()[0].clone();

        assert!(matches!(engine.add_rule(duplicate), Err(Error::Config(_))));
        assert_eq!(engine.rules().len(), before);

        let custom = AdvisorRule {
            name: "custom_rule",
            ..builtin_rules()[0].clone()
        };
        engine.add_rule(custom).unwrap();
        assert_eq!(engine.rules().len(), before + 1);
    }
}

//! Prioritized cleanup orchestration
//!
//! Operations are registered once with a category and priority. A run maps
//! the current pressure level to a set of categories and executes the
//! matching enabled operations sequentially, lowest priority value first.
//! One failing operation never stops the rest of the run.

use crate::config::{CleanupConfig, LevelIntervals};
use crate::error::{Error, Result};
use crate::monitoring::pressure::PressureLevel;
use crate::monitoring::provider::MetricsProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CleanupCategory {
    GarbageCollection,
    ObjectPool,
    Resources,
    Cache,
    Emergency,
    Preventive,
}

impl CleanupCategory {
    /// Categories eligible at a pressure level
    pub fn for_level(level: PressureLevel) -> &'static [CleanupCategory] {
        use CleanupCategory::*;
        match level {
            PressureLevel::Critical => &[
                GarbageCollection,
                ObjectPool,
                Resources,
                Cache,
                Emergency,
                Preventive,
            ],
            PressureLevel::High => &[GarbageCollection, ObjectPool, Resources],
            PressureLevel::Moderate => &[GarbageCollection, Cache],
            PressureLevel::Low | PressureLevel::Normal => &[Cache],
        }
    }
}

impl fmt::Display for CleanupCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Static description of a registered operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupOperation {
    pub name: String,
    pub category: CleanupCategory,
    /// Lower runs first
    pub priority: u32,
    pub estimated_gain_mb: f64,
    pub enabled: bool,
}

impl CleanupOperation {
    pub fn new(
        name: impl Into<String>,
        category: CleanupCategory,
        priority: u32,
        estimated_gain_mb: f64,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            priority,
            estimated_gain_mb,
            enabled: true,
        }
    }
}

/// One step inside an action, e.g. trimming a single pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubOperation {
    pub name: String,
    pub succeeded: bool,
    pub freed_mb: f64,
    pub detail: Option<String>,
}

impl SubOperation {
    pub fn succeeded(name: impl Into<String>, freed_mb: f64) -> Self {
        Self {
            name: name.into(),
            succeeded: true,
            freed_mb: freed_mb.max(0.0),
            detail: None,
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            succeeded: false,
            freed_mb: 0.0,
            detail: Some(detail.into()),
        }
    }

    /// Fold a collaborator call into a sub-operation record
    pub fn from_result(name: impl Into<String>, result: Result<f64>) -> Self {
        match result {
            Ok(freed) => Self::succeeded(name, freed),
            Err(e) => Self::failed(name, e.to_string()),
        }
    }
}

/// What an action reports about its own work
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub sub_operations: Vec<SubOperation>,
}

impl ActionReport {
    pub fn push(&mut self, sub: SubOperation) {
        self.sub_operations.push(sub);
    }

    pub fn self_reported_mb(&self) -> f64 {
        self.sub_operations.iter().map(|s| s.freed_mb).sum()
    }

    pub fn any_succeeded(&self) -> bool {
        self.sub_operations.iter().any(|s| s.succeeded)
    }
}

/// Context handed to every action in a run
#[derive(Debug, Clone, Copy)]
pub struct CleanupContext {
    pub level: PressureLevel,
    /// Bounded wait between aggressive steps
    pub pause: Duration,
}

/// The work behind a registered operation
#[async_trait]
pub trait CleanupAction: Send + Sync {
    async fn execute(&self, ctx: &CleanupContext) -> Result<ActionReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupTrigger {
    Automatic,
    Manual,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub operation: String,
    pub category: CleanupCategory,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub freed_mb: f64,
    pub success: bool,
    pub error: Option<String>,
    pub sub_operations: Vec<SubOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupRun {
    pub id: Uuid,
    pub trigger: CleanupTrigger,
    pub level: PressureLevel,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<CleanupResult>,
    pub total_freed_mb: f64,
    pub success: bool,
}

impl CleanupRun {
    pub fn failed_operations(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }
}

/// Run-level success: at least one result, and either enough memory freed
/// or at least one operation succeeded
pub fn run_succeeded(results: &[CleanupResult], minimum_gain_mb: f64) -> bool {
    if results.is_empty() {
        return false;
    }
    let total: f64 = results.iter().map(|r| r.freed_mb).sum();
    total >= minimum_gain_mb || results.iter().any(|r| r.success)
}

struct RegisteredOperation {
    operation: CleanupOperation,
    action: Arc<dyn CleanupAction>,
}

pub struct CleanupOrchestrator {
    operations: Vec<RegisteredOperation>,
    provider: Option<Arc<dyn MetricsProvider>>,
    minimum_gain_mb: f64,
    pause: Duration,
    intervals: LevelIntervals,
    max_history: usize,
    history: VecDeque<CleanupRun>,
    last_run_at: Option<DateTime<Utc>>,
    total_runs: u64,
    successful_runs: u64,
    failed_operations: u64,
    total_freed_mb: f64,
}

impl CleanupOrchestrator {
    /// `provider` measures before/after usage; without one each action's
    /// self-reported figure is used
    pub fn new(config: &CleanupConfig, provider: Option<Arc<dyn MetricsProvider>>) -> Self {
        Self {
            operations: Vec::new(),
            provider,
            minimum_gain_mb: config.minimum_gain_mb,
            pause: config.emergency_pause,
            intervals: config.level_intervals,
            max_history: config.max_history.max(1),
            history: VecDeque::new(),
            last_run_at: None,
            total_runs: 0,
            successful_runs: 0,
            failed_operations: 0,
            total_freed_mb: 0.0,
        }
    }

    pub fn register(&mut self, operation: CleanupOperation, action: Arc<dyn CleanupAction>) -> Result<()> {
        if self.operations.iter().any(|r| r.operation.name == operation.name) {
            return Err(Error::InvalidState(format!(
                "Cleanup operation '{}' already registered",
                operation.name
            )));
        }
        debug!(name = %operation.name, category = %operation.category, "Registered cleanup operation");
        self.operations.push(RegisteredOperation { operation, action });
        Ok(())
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let registered = self
            .operations
            .iter_mut()
            .find(|r| r.operation.name == name)
            .ok_or_else(|| Error::NotFound(format!("Cleanup operation '{}'", name)))?;
        registered.operation.enabled = enabled;
        Ok(())
    }

    pub fn operations(&self) -> Vec<CleanupOperation> {
        self.operations.iter().map(|r| r.operation.clone()).collect()
    }

    /// Minimum spacing between automatic runs at `level`
    pub fn interval_for(&self, level: PressureLevel) -> Duration {
        self.intervals.for_level(level)
    }

    /// Automatic trigger policy
    pub fn should_run(
        &self,
        current_mb: f64,
        moderate_threshold_mb: f64,
        level: PressureLevel,
        now: DateTime<Utc>,
    ) -> bool {
        if current_mb <= moderate_threshold_mb {
            return false;
        }
        match self.last_run_at {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.interval_for(level))
                .unwrap_or(false),
        }
    }

    /// Run every enabled operation eligible at `level`
    pub async fn run_for_level(
        &mut self,
        level: PressureLevel,
        trigger: CleanupTrigger,
        now: DateTime<Utc>,
    ) -> CleanupRun {
        self.run_categories(CleanupCategory::for_level(level), level, trigger, now)
            .await
    }

    /// Run only the Emergency category
    pub async fn run_emergency(&mut self, now: DateTime<Utc>) -> CleanupRun {
        self.run_categories(
            &[CleanupCategory::Emergency],
            PressureLevel::Critical,
            CleanupTrigger::Emergency,
            now,
        )
        .await
    }

    async fn run_categories(
        &mut self,
        categories: &[CleanupCategory],
        level: PressureLevel,
        trigger: CleanupTrigger,
        now: DateTime<Utc>,
    ) -> CleanupRun {
        let mut selected: Vec<(CleanupOperation, Arc<dyn CleanupAction>)> = self
            .operations
            .iter()
            .filter(|r| r.operation.enabled && categories.contains(&r.operation.category))
            .map(|r| (r.operation.clone(), Arc::clone(&r.action)))
            .collect();
        selected.sort_by(|a, b| {
            a.0.priority
                .cmp(&b.0.priority)
                .then_with(|| a.0.name.cmp(&b.0.name))
        });

        let ctx = CleanupContext {
            level,
            pause: self.pause,
        };
        let started = Instant::now();
        let mut results = Vec::with_capacity(selected.len());

        for (operation, action) in selected {
            let result = self.execute_one(&operation, action.as_ref(), &ctx, now, started).await;
            if result.error.is_some() {
                self.failed_operations += 1;
            }
            results.push(result);
        }

        let total_freed_mb: f64 = results.iter().map(|r| r.freed_mb).sum();
        let success = run_succeeded(&results, self.minimum_gain_mb);

        let run = CleanupRun {
            id: Uuid::new_v4(),
            trigger,
            level,
            started_at: now,
            finished_at: offset(now, started.elapsed()),
            results,
            total_freed_mb,
            success,
        };

        self.last_run_at = Some(now);
        self.total_runs += 1;
        self.total_freed_mb += total_freed_mb;
        if success {
            self.successful_runs += 1;
        }
        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(run.clone());

        info!(
            trigger = ?trigger,
            level = %level,
            operations = run.results.len(),
            freed_mb = total_freed_mb,
            success,
            "Cleanup run complete"
        );
        run
    }

    async fn execute_one(
        &self,
        operation: &CleanupOperation,
        action: &dyn CleanupAction,
        ctx: &CleanupContext,
        now: DateTime<Utc>,
        run_started: Instant,
    ) -> CleanupResult {
        let started_at = offset(now, run_started.elapsed());
        let before = self.measure();
        let outcome = action.execute(ctx).await;
        let after = self.measure();
        let finished_at = offset(now, run_started.elapsed());

        match outcome {
            Ok(report) => {
                let freed_mb = match (before, after) {
                    (Some(before), Some(after)) => (before - after).max(0.0),
                    _ => report.self_reported_mb().max(0.0),
                };
                let success = freed_mb >= self.minimum_gain_mb || report.any_succeeded();
                debug!(name = %operation.name, freed_mb, success, "Cleanup operation finished");

                CleanupResult {
                    operation: operation.name.clone(),
                    category: operation.category,
                    started_at,
                    finished_at,
                    freed_mb,
                    success,
                    error: None,
                    sub_operations: report.sub_operations,
                }
            }
            Err(e) => {
                warn!(name = %operation.name, "Cleanup operation failed: {}", e);
                CleanupResult {
                    operation: operation.name.clone(),
                    category: operation.category,
                    started_at,
                    finished_at,
                    freed_mb: 0.0,
                    success: false,
                    error: Some(e.to_string()),
                    sub_operations: Vec::new(),
                }
            }
        }
    }

    fn measure(&self) -> Option<f64> {
        self.provider
            .as_ref()
            .and_then(|p| p.current_memory_usage().ok())
            .map(|usage| usage.total_mb)
    }

    pub fn history(&self) -> Vec<CleanupRun> {
        self.history.iter().cloned().collect()
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run_at
    }

    pub fn total_runs(&self) -> u64 {
        self.total_runs
    }

    pub fn successful_runs(&self) -> u64 {
        self.successful_runs
    }

    pub fn failed_operations(&self) -> u64 {
        self.failed_operations
    }

    pub fn total_freed_mb(&self) -> f64 {
        self.total_freed_mb
    }

    pub fn minimum_gain_mb(&self) -> f64 {
        self.minimum_gain_mb
    }
}

fn offset(now: DateTime<Utc>, elapsed: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(elapsed)
        .map(|d| now + d)
        .unwrap_or(now)
}

use crate::config::Config;
use crate::error::{Error, ErrorCategory, Result};
use crate::events::{EventBus, EventStats, MonitorEvent};
use crate::monitoring::alerting::{Alert, AlertDispatcher, AlertKind, AlertRequest};
use crate::monitoring::collector::SnapshotCollector;
use crate::monitoring::history::{HistoryBuffer, SharedHistory};
use crate::monitoring::leak::{ConfirmationChange, LeakConfirmationEngine, LeakRecord};
use crate::monitoring::patterns::{Pattern, PatternDetector, Severity};
use crate::monitoring::pressure::{
    PressureLevel, PressureStateMachine, PressureThresholds, PressureUpdate,
};
use crate::monitoring::provider::{AbsentMetricsProvider, MetricsProvider};
use crate::monitoring::snapshot::Snapshot;
use crate::optimization::advisor::{
    AdvisorContext, AdvisorEngine, AdvisorRule, Insight, Recommendation, RecommendationStatus,
};
use crate::optimization::cleanup::{
    CleanupAction, CleanupOperation, CleanupOrchestrator, CleanupRun, CleanupTrigger,
};
use crate::optimization::collaborators::{builtin_operations, snapshots_to_keep, HostCollaborators};
use crate::optimization::emergency::{EmergencyAction, EmergencyMode, EmergencyResolution};
use crate::reports::{
    AnalysisReport, CleanupSummary, EmergencySummary, FailureCounters, LeakReport,
    OptimizationReport, PressureReport,
};
use crate::utils::PassGuard;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Independently ticked parts of the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Collection,
    Detection,
    Pressure,
    Cleanup,
    Advisory,
}

impl Subsystem {
    pub const ALL: [Subsystem; 5] = [
        Subsystem::Collection,
        Subsystem::Detection,
        Subsystem::Pressure,
        Subsystem::Cleanup,
        Subsystem::Advisory,
    ];

    fn index(self) -> usize {
        match self {
            Self::Collection => 0,
            Self::Detection => 1,
            Self::Pressure => 2,
            Self::Cleanup => 3,
            Self::Advisory => 4,
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Collection => "collection",
            Self::Detection => "detection",
            Self::Pressure => "pressure",
            Self::Cleanup => "cleanup",
            Self::Advisory => "advisory",
        };
        f.write_str(name)
    }
}

/// Result of a pass that may have been skipped by its in-progress guard
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome<T> {
    Completed(T),
    /// A pass of the same kind was still running
    Skipped,
}

impl<T> PassOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Skipped => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSummary {
    /// History was too short to analyze
    pub insufficient_history: bool,
    pub patterns: Vec<Pattern>,
    pub leak: Option<LeakRecord>,
    pub confirmation_change: Option<ConfirmationChange>,
    pub findings_in_window: usize,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PressureSummary {
    pub level: PressureLevel,
    pub update: PressureUpdate,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvisorySummary {
    pub recommendations: Vec<Recommendation>,
    pub insights: Vec<Insight>,
}

struct Shared {
    config: Config,
    history: SharedHistory,
    collector: SnapshotCollector,
    detector: RwLock<PatternDetector>,
    pressure: RwLock<PressureStateMachine>,
    leak: RwLock<LeakConfirmationEngine>,
    alerts: Mutex<AlertDispatcher>,
    alerts_enabled: AtomicBool,
    cleanup: tokio::sync::Mutex<CleanupOrchestrator>,
    emergency: Mutex<EmergencyMode>,
    advisor: RwLock<AdvisorEngine>,
    events: EventBus,
    enabled: [AtomicBool; 5],
    in_progress: [AtomicBool; 5],
    analysis_failures: AtomicU64,
    cleanup_failures: AtomicU64,
    running: AtomicBool,
    shutdown: Notify,
    tasks: Mutex<HashMap<Subsystem, JoinHandle<()>>>,
}

/// Assembles a [`MemoryHealthMonitor`] from config and injected collaborators
pub struct MonitorBuilder {
    config: Config,
    provider: Option<Arc<dyn MetricsProvider>>,
    host: HostCollaborators,
    builtin_cleanup: bool,
    operations: Vec<(CleanupOperation, Arc<dyn CleanupAction>)>,
    rules: Vec<AdvisorRule>,
}

impl MonitorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            provider: None,
            host: HostCollaborators::default(),
            builtin_cleanup: true,
            operations: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn host(mut self, host: HostCollaborators) -> Self {
        self.host = host;
        self
    }

    /// Skip the built-in cleanup registry
    pub fn without_builtin_cleanup(mut self) -> Self {
        self.builtin_cleanup = false;
        self
    }

    pub fn cleanup_operation(
        mut self,
        operation: CleanupOperation,
        action: Arc<dyn CleanupAction>,
    ) -> Self {
        self.operations.push((operation, action));
        self
    }

    pub fn advisor_rule(mut self, rule: AdvisorRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn build(self) -> Result<MemoryHealthMonitor> {
        let config = self.config;
        config.validate()?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => default_provider(),
        };

        let history = HistoryBuffer::shared(config.collection.history_capacity);
        let collector = SnapshotCollector::new(Arc::clone(&provider), Arc::clone(&history));

        let mut cleanup = CleanupOrchestrator::new(&config.cleanup, Some(Arc::clone(&provider)));
        if self.builtin_cleanup {
            let keep = snapshots_to_keep(
                config.patterns.analysis_window,
                config.collection.history_capacity,
            );
            for (operation, action) in builtin_operations(&self.host, Arc::clone(&history), keep) {
                cleanup.register(operation, action)?;
            }
        }
        for (operation, action) in self.operations {
            cleanup.register(operation, action)?;
        }

        let mut advisor = AdvisorEngine::new(&config.advisor);
        for rule in self.rules {
            advisor.add_rule(rule)?;
        }

        let enabled = [
            AtomicBool::new(config.collection.enabled),
            AtomicBool::new(config.patterns.enabled),
            AtomicBool::new(config.pressure.enabled),
            AtomicBool::new(config.cleanup.enabled),
            AtomicBool::new(config.advisor.enabled),
        ];

        let shared = Shared {
            history,
            collector,
            detector: RwLock::new(PatternDetector::new(config.patterns.clone())),
            pressure: RwLock::new(PressureStateMachine::new(&config.pressure)),
            leak: RwLock::new(LeakConfirmationEngine::new(
                &config.leak,
                config.alerts.escalate_after_consecutive,
            )),
            alerts: Mutex::new(AlertDispatcher::new(&config.alerts)),
            alerts_enabled: AtomicBool::new(config.alerts.enabled),
            cleanup: tokio::sync::Mutex::new(cleanup),
            emergency: Mutex::new(EmergencyMode::new(&config.cleanup)),
            advisor: RwLock::new(advisor),
            events: EventBus::default(),
            enabled,
            in_progress: Default::default(),
            analysis_failures: AtomicU64::new(0),
            cleanup_failures: AtomicU64::new(0),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            tasks: Mutex::new(HashMap::new()),
            config,
        };

        Ok(MemoryHealthMonitor {
            shared: Arc::new(shared),
        })
    }
}

#[cfg(feature = "monitoring")]
fn default_provider() -> Arc<dyn MetricsProvider> {
    match crate::monitoring::provider::SystemMetricsProvider::new() {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            warn!("Process metrics unavailable, sampling will fail: {}", e);
            Arc::new(AbsentMetricsProvider)
        }
    }
}

#[cfg(not(feature = "monitoring"))]
fn default_provider() -> Arc<dyn MetricsProvider> {
    warn!("No metrics provider configured, sampling will fail");
    Arc::new(AbsentMetricsProvider)
}

/// Runtime memory health monitor.
///
/// Owns every component and one timer loop per [`Subsystem`]. Cloning is
/// cheap and every clone drives the same monitor. Each pass is also callable
/// directly with an explicit `now`, which is how hosts trigger work out of
/// band and how tests drive the monitor deterministically.
#[derive(Clone)]
pub struct MemoryHealthMonitor {
    shared: Arc<Shared>,
}

impl MemoryHealthMonitor {
    pub fn builder(config: Config) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn history(&self) -> SharedHistory {
        Arc::clone(&self.shared.history)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    pub fn event_stats(&self) -> EventStats {
        self.shared.events.stats()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self, subsystem: Subsystem) -> bool {
        self.shared.enabled[subsystem.index()].load(Ordering::SeqCst)
    }

    /// Spawn a loop for every enabled subsystem
    pub async fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState("Monitor is already running".to_string()));
        }

        info!("Starting memory health monitor");
        for subsystem in Subsystem::ALL {
            if self.is_enabled(subsystem) {
                self.spawn_loop(subsystem);
            }
        }
        Ok(())
    }

    /// Stop every loop and wait for in-flight passes to finish
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.shared.shutdown.notify_waiters();
        let handles: Vec<(Subsystem, JoinHandle<()>)> =
            self.shared.tasks.lock().drain().collect();
        for (subsystem, handle) in handles {
            if let Err(e) = handle.await {
                error!(%subsystem, "Monitor loop ended abnormally: {}", e);
            }
        }
        info!("Memory health monitor stopped");
    }

    /// Toggle a subsystem. Disabling ends its loop at the next tick; enabling
    /// a stopped loop on a running monitor restarts it.
    pub fn set_enabled(&self, subsystem: Subsystem, enabled: bool) {
        self.shared.enabled[subsystem.index()].store(enabled, Ordering::SeqCst);
        info!(%subsystem, enabled, "Subsystem toggled");

        if enabled && self.is_running() {
            self.spawn_loop(subsystem);
        }
    }

    pub fn set_alerts_enabled(&self, enabled: bool) {
        self.shared.alerts_enabled.store(enabled, Ordering::SeqCst);
    }

    fn spawn_loop(&self, subsystem: Subsystem) {
        let mut tasks = self.shared.tasks.lock();
        if let Some(handle) = tasks.get(&subsystem) {
            if !handle.is_finished() {
                return;
            }
        }
        let handle = tokio::spawn(self.clone().run_loop(subsystem));
        tasks.insert(subsystem, handle);
    }

    fn interval_for(&self, subsystem: Subsystem) -> Duration {
        let config = &self.shared.config;
        let period = match subsystem {
            Subsystem::Collection => config.collection.interval,
            Subsystem::Detection => config.patterns.interval,
            Subsystem::Pressure => config.pressure.interval,
            Subsystem::Cleanup => config.cleanup.interval,
            Subsystem::Advisory => config.advisor.interval,
        };
        period.max(Duration::from_millis(1))
    }

    async fn run_loop(self, subsystem: Subsystem) {
        let period = self.interval_for(subsystem);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(%subsystem, ?period, "Monitor loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shared.shutdown.notified() => break,
            }
            if !self.is_running() || !self.is_enabled(subsystem) {
                break;
            }
            self.tick(subsystem).await;
        }

        debug!(%subsystem, "Monitor loop exited");
    }

    async fn tick(&self, subsystem: Subsystem) {
        let now = Utc::now();
        let result = match subsystem {
            Subsystem::Collection => self.collect_sample(now).map(|_| ()),
            Subsystem::Detection => self.run_detection_pass(now).map(|_| ()),
            Subsystem::Pressure => self.run_pressure_pass(now).await.map(|_| ()),
            Subsystem::Cleanup => self.run_cleanup_pass(now).await.map(|_| ()),
            Subsystem::Advisory => self.run_advisory_pass(now).await.map(|_| ()),
        };

        if let Err(e) = result {
            self.record_failure(subsystem, &e);
        }
    }

    fn record_failure(&self, subsystem: Subsystem, e: &Error) {
        match e.category() {
            // The collector keeps its own sampling counter
            ErrorCategory::Sampling => {}
            ErrorCategory::Cleanup => {
                self.shared.cleanup_failures.fetch_add(1, Ordering::Relaxed);
                error!(%subsystem, "Cleanup pass failed: {}", e);
            }
            _ => {
                self.shared.analysis_failures.fetch_add(1, Ordering::Relaxed);
                error!(%subsystem, "Pass failed: {}", e);
            }
        }
    }

    /// Sample the provider once and append the snapshot to history
    pub fn collect_sample(&self, now: DateTime<Utc>) -> Result<Snapshot> {
        self.shared.collector.collect(now)
    }

    /// Append an externally captured snapshot
    pub fn ingest_snapshot(&self, snapshot: Snapshot) {
        self.shared.history.write().push(snapshot);
    }

    /// Drop history and everything derived from it
    pub fn clear_history(&self) {
        self.shared.history.write().clear();
        self.shared.detector.write().clear();
        self.shared.leak.write().reset();
        self.shared.pressure.write().reset();
        info!("History cleared");
    }

    pub fn set_pressure_thresholds(&self, thresholds: PressureThresholds) -> Result<()> {
        self.shared.pressure.write().set_thresholds(thresholds)
    }

    pub fn pressure_level(&self) -> PressureLevel {
        self.shared.pressure.read().level()
    }

    pub fn is_leak_confirmed(&self) -> bool {
        self.shared.leak.read().is_confirmed()
    }

    pub fn is_emergency_active(&self) -> bool {
        self.shared.emergency.lock().is_active()
    }

    fn latest_reading(&self) -> Option<(f64, DateTime<Utc>)> {
        self.shared
            .history
            .read()
            .latest()
            .map(|snapshot| (snapshot.total_mb(), snapshot.timestamp))
    }

    fn dispatch_alert(&self, request: AlertRequest, now: DateTime<Utc>) -> Option<Alert> {
        if !self.shared.alerts_enabled.load(Ordering::SeqCst) {
            debug!(kind = ?request.kind, "Alerts disabled, dropping request");
            return None;
        }

        let alert = self.shared.alerts.lock().issue(request, now)?;
        self.shared
            .events
            .publish(MonitorEvent::AlertIssued(alert.clone()));
        Some(alert)
    }

    /// Run pattern detection and leak confirmation over the history tail
    pub fn run_detection_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome<DetectionSummary>> {
        let Some(_guard) = PassGuard::try_acquire(&self.shared.in_progress[Subsystem::Detection.index()])
        else {
            debug!("Detection pass still running, skipping");
            return Ok(PassOutcome::Skipped);
        };

        let window = {
            let patterns = &self.shared.config.patterns;
            let count = patterns.analysis_window.max(patterns.min_samples);
            self.shared.history.read().recent(count)
        };
        if let Some(bad) = window.iter().find(|s| !s.total_mb().is_finite()) {
            return Err(Error::Analysis(format!(
                "Non-finite memory reading at {}",
                bad.timestamp.to_rfc3339()
            )));
        }

        let outcome = self.shared.detector.write().detect(&window, now);
        let Some(outcome) = outcome else {
            debug!(samples = window.len(), "Not enough history for detection");
            return Ok(PassOutcome::Completed(DetectionSummary {
                insufficient_history: true,
                ..Default::default()
            }));
        };

        for pattern in &outcome.patterns {
            self.shared
                .events
                .publish(MonitorEvent::PatternDetected(pattern.clone()));
        }

        let confirmation = self.shared.leak.write().evaluate(outcome.leak.as_ref(), now);
        if let Some(change) = confirmation.change {
            info!(
                confirmed = change.confirmed,
                findings = change.findings_in_window,
                "Leak confirmation changed"
            );
            self.shared
                .events
                .publish(MonitorEvent::LeakConfirmationChanged(change));
        }

        let alerts = confirmation
            .alert
            .and_then(|request| self.dispatch_alert(request, now))
            .into_iter()
            .collect();

        Ok(PassOutcome::Completed(DetectionSummary {
            insufficient_history: false,
            patterns: outcome.patterns,
            leak: outcome.leak,
            confirmation_change: confirmation.change,
            findings_in_window: confirmation.findings_in_window,
            alerts,
        }))
    }

    /// Reclassify pressure and trend
    pub async fn run_pressure_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome<PressureSummary>> {
        let Some(_guard) = PassGuard::try_acquire(&self.shared.in_progress[Subsystem::Pressure.index()])
        else {
            debug!("Pressure pass still running, skipping");
            return Ok(PassOutcome::Skipped);
        };

        let required = self.shared.pressure.read().required_samples();
        let totals = self.shared.history.read().recent_totals(required);
        if totals.iter().any(|total| !total.is_finite()) {
            return Err(Error::Analysis("Non-finite memory reading in pressure window".to_string()));
        }

        let update = self.shared.pressure.write().analyze(&totals, now);
        let level = self.pressure_level();
        let mut alerts = Vec::new();

        if let Some(change) = update.level_change {
            self.shared
                .events
                .publish(MonitorEvent::PressureLevelChanged(change));

            if change.to == PressureLevel::Critical {
                let request = AlertRequest::new(
                    AlertKind::CriticalPressure,
                    Severity::Critical,
                    format!("Memory pressure critical at {:.1}MB", change.smoothed_mb),
                );
                alerts.extend(self.dispatch_alert(request, now));
            }
        }
        if let Some(change) = update.trend_change {
            self.shared
                .events
                .publish(MonitorEvent::TrendChanged { change, at: now });
        }

        Ok(PassOutcome::Completed(PressureSummary {
            level,
            update,
            alerts,
        }))
    }

    /// Activate or retry Emergency Mode for the reading `current_mb` taken at
    /// `reading_at`, running the emergency category when due.
    ///
    /// Only called from the cleanup pass, under its guard.
    async fn handle_emergency(
        &self,
        current_mb: f64,
        reading_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<CleanupRun> {
        let action = self.shared.emergency.lock().check(current_mb, reading_at, now);
        match action {
            EmergencyAction::None => return None,
            EmergencyAction::Activate => {
                let threshold_mb = self.shared.emergency.lock().threshold_mb();
                self.shared.events.publish(MonitorEvent::EmergencyModeActivated {
                    current_mb,
                    threshold_mb,
                    at: now,
                });
                let request = AlertRequest::new(
                    AlertKind::EmergencyMode,
                    Severity::Critical,
                    format!(
                        "Emergency memory mode: {:.1}MB over {:.1}MB threshold",
                        current_mb, threshold_mb
                    ),
                );
                self.dispatch_alert(request, now);
            }
            EmergencyAction::Retry => {
                debug!(current_mb, "Retrying emergency cleanup");
            }
        }

        let run = {
            let mut cleanup = self.shared.cleanup.lock().await;
            cleanup.run_emergency(now).await
        };
        self.finish_cleanup_run(&run);

        let post_mb = match self.shared.collector.provider().current_memory_usage() {
            Ok(usage) => usage.total_mb,
            Err(e) => {
                debug!("Post-cleanup reading failed, using freed estimate: {}", e);
                (current_mb - run.total_freed_mb).max(0.0)
            }
        };

        let resolution = self.shared.emergency.lock().after_cleanup(post_mb, now);
        if resolution == EmergencyResolution::Deactivated {
            self.shared.events.publish(MonitorEvent::EmergencyModeDeactivated {
                current_mb: post_mb,
                at: now,
            });
        }
        Some(run)
    }

    fn finish_cleanup_run(&self, run: &CleanupRun) {
        let failed = run.failed_operations() as u64;
        if failed > 0 {
            self.shared.cleanup_failures.fetch_add(failed, Ordering::Relaxed);
        }
        self.shared
            .events
            .publish(MonitorEvent::CleanupCompleted(run.clone()));
    }

    /// Automatic cleanup: Emergency Mode first, otherwise the level policy.
    ///
    /// Completes with `None` when nothing was due.
    pub async fn run_cleanup_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome<Option<CleanupRun>>> {
        let Some(_guard) = PassGuard::try_acquire(&self.shared.in_progress[Subsystem::Cleanup.index()])
        else {
            debug!("Cleanup pass still running, skipping");
            return Ok(PassOutcome::Skipped);
        };

        let Some((current_mb, reading_at)) = self.latest_reading() else {
            return Ok(PassOutcome::Completed(None));
        };

        if let Some(run) = self.handle_emergency(current_mb, reading_at, now).await {
            return Ok(PassOutcome::Completed(Some(run)));
        }
        if self.is_emergency_active() {
            // Waiting for the next emergency retry
            return Ok(PassOutcome::Completed(None));
        }

        let (level, moderate_mb) = {
            let pressure = self.shared.pressure.read();
            (pressure.level(), pressure.thresholds().moderate)
        };

        let run = {
            let mut cleanup = self.shared.cleanup.lock().await;
            if !cleanup.should_run(current_mb, moderate_mb, level, now) {
                return Ok(PassOutcome::Completed(None));
            }
            cleanup.run_for_level(level, CleanupTrigger::Automatic, now).await
        };
        self.finish_cleanup_run(&run);
        Ok(PassOutcome::Completed(Some(run)))
    }

    /// Out-of-band cleanup at `level`, or the current pressure level
    pub async fn trigger_cleanup(
        &self,
        level: Option<PressureLevel>,
        now: DateTime<Utc>,
    ) -> Result<PassOutcome<CleanupRun>> {
        let Some(_guard) = PassGuard::try_acquire(&self.shared.in_progress[Subsystem::Cleanup.index()])
        else {
            debug!("Cleanup pass still running, skipping manual trigger");
            return Ok(PassOutcome::Skipped);
        };

        let level = level.unwrap_or_else(|| self.pressure_level());
        let run = {
            let mut cleanup = self.shared.cleanup.lock().await;
            cleanup.run_for_level(level, CleanupTrigger::Manual, now).await
        };
        self.finish_cleanup_run(&run);
        Ok(PassOutcome::Completed(run))
    }

    pub async fn register_cleanup_operation(
        &self,
        operation: CleanupOperation,
        action: Arc<dyn CleanupAction>,
    ) -> Result<()> {
        self.shared.cleanup.lock().await.register(operation, action)
    }

    pub async fn set_cleanup_operation_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.shared.cleanup.lock().await.set_enabled(name, enabled)
    }

    /// Re-evaluate recommendations and derive insights
    pub async fn run_advisory_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome<AdvisorySummary>> {
        let Some(_guard) = PassGuard::try_acquire(&self.shared.in_progress[Subsystem::Advisory.index()])
        else {
            debug!("Advisory pass still running, skipping");
            return Ok(PassOutcome::Skipped);
        };

        let ctx = self.advisor_context().await;
        if !ctx.current_mb.is_finite() {
            return Err(Error::Analysis("Non-finite memory reading in advisor context".to_string()));
        }

        let (recommendations, insights) = {
            let mut advisor = self.shared.advisor.write();
            let recommendations = advisor.evaluate(&ctx, now).to_vec();
            let insights = advisor.refresh_insights(&ctx, now);
            (recommendations, insights)
        };

        debug!(
            recommendations = recommendations.len(),
            insights = insights.len(),
            "Advisory pass complete"
        );
        self.shared.events.publish(MonitorEvent::RecommendationsUpdated {
            recommendations: recommendations.clone(),
        });
        for insight in &insights {
            self.shared
                .events
                .publish(MonitorEvent::InsightGenerated(insight.clone()));
        }

        Ok(PassOutcome::Completed(AdvisorySummary {
            recommendations,
            insights,
        }))
    }

    async fn advisor_context(&self) -> AdvisorContext {
        let (latest, first) = {
            let history = self.shared.history.read();
            let pair = (history.latest().cloned(), history.iter().next().cloned());
            pair
        };
        let (cleanup_runs, successful_runs, total_freed_mb) = {
            let cleanup = self.shared.cleanup.lock().await;
            (
                cleanup.total_runs(),
                cleanup.successful_runs(),
                cleanup.total_freed_mb(),
            )
        };

        let mut ctx = AdvisorContext {
            cleanup_runs,
            ..Default::default()
        };
        if cleanup_runs > 0 {
            ctx.cleanup_success_rate = successful_runs as f64 / cleanup_runs as f64;
            ctx.average_freed_mb = total_freed_mb / cleanup_runs as f64;
        }

        if let Some(latest) = &latest {
            ctx.current_mb = latest.memory.total_mb;
            ctx.managed_mb = latest.memory.managed_mb;
            ctx.unmanaged_mb = latest.memory.unmanaged_mb;
            ctx.frame_rate = latest.frame_rate;
            ctx.object_counts = latest.object_counts.clone();

            if let Some(first) = &first {
                ctx.history_growth_mb = latest.total_mb() - first.total_mb();
                ctx.history_span_minutes =
                    (latest.timestamp - first.timestamp).num_milliseconds() as f64 / 60_000.0;
            }
        }

        {
            let pressure = self.shared.pressure.read();
            ctx.pressure_level = pressure.level();
            if pressure.passes() > 0 {
                ctx.trend = Some(pressure.trend());
            }
            ctx.trend_rate = pressure.trend_rate();
        }
        {
            let leak = self.shared.leak.read();
            ctx.leak_confirmed = leak.is_confirmed();
            ctx.leak_findings_in_window = leak.findings_in_window();
            ctx.leak_growth_rate_mb_per_min =
                leak.latest_record().map(|record| record.growth_rate_mb_per_min);
        }
        ctx.pattern_counts = self.shared.detector.read().counts_by_type();
        {
            let emergency = self.shared.emergency.lock();
            ctx.emergency_active = emergency.is_active();
            ctx.emergency_activations = emergency.activations();
        }
        ctx
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.shared.advisor.read().recommendations().to_vec()
    }

    pub fn set_recommendation_status(&self, id: Uuid, status: RecommendationStatus) -> Result<()> {
        self.shared.advisor.write().set_status(id, status)
    }

    pub fn failure_counters(&self) -> FailureCounters {
        FailureCounters {
            sampling: self.shared.collector.stats().sampling_failures,
            analysis: self.shared.analysis_failures.load(Ordering::Relaxed),
            cleanup: self.shared.cleanup_failures.load(Ordering::Relaxed),
        }
    }

    pub fn leak_report(&self) -> LeakReport {
        LeakReport::from_engine(&self.shared.leak.read(), Utc::now())
    }

    pub fn pressure_report(&self) -> PressureReport {
        let pressure = self.shared.pressure.read();
        let emergency = self.shared.emergency.lock();
        PressureReport::from_state(&pressure, &emergency, Utc::now())
    }

    pub fn analysis_report(&self) -> AnalysisReport {
        let now = Utc::now();
        let (current, history_len, history_capacity) = {
            let history = self.shared.history.read();
            (history.latest().cloned(), history.len(), history.capacity())
        };
        let (patterns, pattern_counts) = {
            let detector = self.shared.detector.read();
            (detector.retained(), detector.counts_by_type())
        };
        let (alerts, recent_alerts) = {
            let dispatcher = self.shared.alerts.lock();
            (dispatcher.stats(), dispatcher.recent_alerts())
        };

        AnalysisReport {
            generated_at: now,
            current,
            history_len,
            history_capacity,
            collector: self.shared.collector.stats(),
            patterns,
            pattern_counts,
            pressure: self.pressure_report(),
            leak: self.leak_report(),
            alerts,
            recent_alerts,
            failures: self.failure_counters(),
            insights: self.shared.advisor.read().insights(),
        }
    }

    pub async fn optimization_report(&self) -> OptimizationReport {
        let (cleanup, operations) = {
            let orchestrator = self.shared.cleanup.lock().await;
            (
                CleanupSummary::from_orchestrator(&orchestrator),
                orchestrator.operations(),
            )
        };

        OptimizationReport {
            generated_at: Utc::now(),
            recommendations: self.recommendations(),
            cleanup,
            emergency: EmergencySummary::from_mode(&self.shared.emergency.lock()),
            operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::provider::ScriptedMetricsProvider;
    use crate::monitoring::snapshot::MemoryUsage;
    use chrono::Duration as ChronoDuration;

    fn scripted_monitor(totals: &[f64]) -> MemoryHealthMonitor {
        MemoryHealthMonitor::builder(Config::default())
            .provider(Arc::new(ScriptedMetricsProvider::from_totals(totals)))
            .build()
            .unwrap()
    }

    fn ingest_ramp(monitor: &MemoryHealthMonitor, start: DateTime<Utc>, count: i64, mb_per_min: f64) {
        for i in 0..count {
            let total = 100.0 + mb_per_min * i as f64;
            monitor.ingest_snapshot(Snapshot::new(
                start + ChronoDuration::minutes(i),
                MemoryUsage::new(total, total * 0.9, total * 0.1),
            ));
        }
    }

    #[test]
    fn test_detection_requires_history() {
        let monitor = scripted_monitor(&[100.0]);
        let summary = monitor
            .run_detection_pass(Utc::now())
            .unwrap()
            .completed()
            .unwrap();
        assert!(summary.insufficient_history);
        assert!(summary.patterns.is_empty());
    }

    #[test]
    fn test_detection_pass_is_skipped_while_in_progress() {
        let monitor = scripted_monitor(&[100.0]);
        let flag = &monitor.shared.in_progress[Subsystem::Detection.index()];
        let _held = PassGuard::try_acquire(flag).unwrap();

        assert!(monitor.run_detection_pass(Utc::now()).unwrap().is_skipped());
    }

    #[test]
    fn test_leak_confirms_after_two_passes() {
        let monitor = scripted_monitor(&[100.0]);
        let start = Utc::now();
        ingest_ramp(&monitor, start, 10, 10.0);

        let now = start + ChronoDuration::minutes(10);
        let first = monitor.run_detection_pass(now).unwrap().completed().unwrap();
        assert!(first.leak.is_some());
        assert!(!monitor.is_leak_confirmed());

        let second = monitor
            .run_detection_pass(now + ChronoDuration::seconds(60))
            .unwrap()
            .completed()
            .unwrap();
        assert!(monitor.is_leak_confirmed());
        assert!(second.confirmation_change.unwrap().confirmed);
        assert_eq!(second.alerts.len(), 1);
        assert_eq!(second.alerts[0].kind, AlertKind::LeakConfirmed);
    }

    #[test]
    fn test_non_finite_reading_is_analysis_error() {
        let monitor = scripted_monitor(&[100.0]);
        let start = Utc::now();
        ingest_ramp(&monitor, start, 9, 1.0);
        monitor.ingest_snapshot(Snapshot::new(
            start + ChronoDuration::minutes(9),
            MemoryUsage::new(f64::NAN, 0.0, 0.0),
        ));

        let err = monitor.run_detection_pass(start).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Analysis);
    }

    #[test]
    fn test_clear_history_resets_derived_state() {
        let monitor = scripted_monitor(&[100.0]);
        let start = Utc::now();
        ingest_ramp(&monitor, start, 10, 10.0);
        monitor.run_detection_pass(start).unwrap();
        monitor.clear_history();

        assert!(monitor.history().read().is_empty());
        assert!(monitor.analysis_report().patterns.is_empty());
        assert!(!monitor.is_leak_confirmed());
    }

    #[tokio::test]
    async fn test_pressure_pass_publishes_level_change() {
        let monitor = scripted_monitor(&[100.0]);
        let mut events = monitor.subscribe();
        monitor.ingest_snapshot(Snapshot::new(Utc::now(), MemoryUsage::new(1600.0, 1400.0, 200.0)));

        let summary = monitor
            .run_pressure_pass(Utc::now())
            .await
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(summary.level, PressureLevel::High);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind(), "pressure_level_changed");
    }

    #[tokio::test]
    async fn test_invalid_thresholds_are_rejected() {
        let monitor = scripted_monitor(&[100.0]);
        let bad = PressureThresholds {
            low: 100.0,
            moderate: 50.0,
            high: 150.0,
            critical: 200.0,
        };
        assert!(monitor.set_pressure_thresholds(bad).is_err());
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let monitor = scripted_monitor(&[100.0]);
        monitor.start().await.unwrap();
        assert!(monitor.start().await.is_err());
        monitor.stop().await;
        assert!(!monitor.is_running());
    }
}

//! Host collaborators and the built-in cleanup actions wired to them
//!
//! Collaborators are injected at construction. Any of them may be absent;
//! an action whose collaborator is missing records a failed sub-operation
//! with zero gain instead of erroring.

use crate::error::Result;
use crate::monitoring::history::SharedHistory;
use crate::monitoring::provider::SimulatedMetricsProvider;
use crate::optimization::cleanup::{
    ActionReport, CleanupAction, CleanupCategory, CleanupContext, CleanupOperation, SubOperation,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Approximate footprint of one retained snapshot
const SNAPSHOT_FOOTPRINT_MB: f64 = 0.002;

#[async_trait]
pub trait GarbageCollector: Send + Sync {
    /// Force a collection; returns the estimated MB reclaimed
    async fn collect(&self) -> Result<f64>;
}

pub trait ObjectPoolRegistry: Send + Sync {
    fn pool_names(&self) -> Vec<String>;
    /// Release idle pooled objects; returns MB released
    fn trim_pool(&self, name: &str) -> Result<f64>;
}

pub trait ResourceRegistry: Send + Sync {
    /// Unload resources with no live references; returns MB released
    fn unload_unused(&self) -> Result<f64>;
}

pub trait CacheRegistry: Send + Sync {
    fn cache_names(&self) -> Vec<String>;
    fn purge_expired(&self, name: &str) -> Result<f64>;
    /// Drop `fraction` (0..=1) of a cache's entries
    fn shrink(&self, name: &str, fraction: f64) -> Result<f64>;
}

/// Injected host collaborators
#[derive(Clone, Default)]
pub struct HostCollaborators {
    pub garbage_collector: Option<Arc<dyn GarbageCollector>>,
    pub object_pools: Option<Arc<dyn ObjectPoolRegistry>>,
    pub resources: Option<Arc<dyn ResourceRegistry>>,
    pub caches: Option<Arc<dyn CacheRegistry>>,
}

impl HostCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_garbage_collector(mut self, gc: Arc<dyn GarbageCollector>) -> Self {
        self.garbage_collector = Some(gc);
        self
    }

    pub fn with_object_pools(mut self, pools: Arc<dyn ObjectPoolRegistry>) -> Self {
        self.object_pools = Some(pools);
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceRegistry>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_caches(mut self, caches: Arc<dyn CacheRegistry>) -> Self {
        self.caches = Some(caches);
        self
    }

    /// Wire every collaborator to one simulated host
    pub fn simulated(host: Arc<SimulatedHost>) -> Self {
        Self::new()
            .with_garbage_collector(host.clone())
            .with_object_pools(host.clone())
            .with_resources(host.clone())
            .with_caches(host)
    }
}

async fn collect_garbage(host: &HostCollaborators, report: &mut ActionReport) {
    match &host.garbage_collector {
        Some(gc) => report.push(SubOperation::from_result("gc.collect", gc.collect().await)),
        None => report.push(SubOperation::failed("gc.collect", "no garbage collector registered")),
    }
}

fn trim_pools(host: &HostCollaborators, report: &mut ActionReport) {
    let Some(pools) = &host.object_pools else {
        report.push(SubOperation::failed("pools", "no object pool registry registered"));
        return;
    };
    for name in pools.pool_names() {
        report.push(SubOperation::from_result(format!("pool.{}", name), pools.trim_pool(&name)));
    }
}

fn unload_resources(host: &HostCollaborators, report: &mut ActionReport) {
    match &host.resources {
        Some(resources) => report.push(SubOperation::from_result(
            "resources.unload_unused",
            resources.unload_unused(),
        )),
        None => report.push(SubOperation::failed(
            "resources.unload_unused",
            "no resource registry registered",
        )),
    }
}

fn shrink_caches(host: &HostCollaborators, fraction: f64, report: &mut ActionReport) {
    let Some(caches) = &host.caches else {
        report.push(SubOperation::failed("caches", "no cache registry registered"));
        return;
    };
    for name in caches.cache_names() {
        report.push(SubOperation::from_result(
            format!("cache.{}.shrink", name),
            caches.shrink(&name, fraction),
        ));
    }
}

pub struct CollectGarbage {
    host: HostCollaborators,
}

#[async_trait]
impl CleanupAction for CollectGarbage {
    async fn execute(&self, _ctx: &CleanupContext) -> Result<ActionReport> {
        let mut report = ActionReport::default();
        collect_garbage(&self.host, &mut report).await;
        Ok(report)
    }
}

pub struct TrimObjectPools {
    host: HostCollaborators,
}

#[async_trait]
impl CleanupAction for TrimObjectPools {
    async fn execute(&self, _ctx: &CleanupContext) -> Result<ActionReport> {
        let mut report = ActionReport::default();
        trim_pools(&self.host, &mut report);
        Ok(report)
    }
}

pub struct UnloadUnusedResources {
    host: HostCollaborators,
}

#[async_trait]
impl CleanupAction for UnloadUnusedResources {
    async fn execute(&self, _ctx: &CleanupContext) -> Result<ActionReport> {
        let mut report = ActionReport::default();
        unload_resources(&self.host, &mut report);
        Ok(report)
    }
}

pub struct PurgeExpiredCache {
    host: HostCollaborators,
}

#[async_trait]
impl CleanupAction for PurgeExpiredCache {
    async fn execute(&self, _ctx: &CleanupContext) -> Result<ActionReport> {
        let mut report = ActionReport::default();
        match &self.host.caches {
            Some(caches) => {
                for name in caches.cache_names() {
                    report.push(SubOperation::from_result(
                        format!("cache.{}.purge_expired", name),
                        caches.purge_expired(&name),
                    ));
                }
            }
            None => report.push(SubOperation::failed("caches", "no cache registry registered")),
        }
        Ok(report)
    }
}

/// Drops a share of every cache, more at higher pressure
pub struct ShrinkCaches {
    host: HostCollaborators,
}

#[async_trait]
impl CleanupAction for ShrinkCaches {
    async fn execute(&self, ctx: &CleanupContext) -> Result<ActionReport> {
        use crate::monitoring::pressure::PressureLevel;

        let fraction = match ctx.level {
            PressureLevel::Critical => 0.75,
            PressureLevel::High => 0.5,
            _ => 0.25,
        };
        let mut report = ActionReport::default();
        shrink_caches(&self.host, fraction, &mut report);
        Ok(report)
    }
}

/// Every collaborator at full strength, with short pauses so the host can
/// settle between steps
pub struct EmergencyFullRelease {
    host: HostCollaborators,
}

#[async_trait]
impl CleanupAction for EmergencyFullRelease {
    async fn execute(&self, ctx: &CleanupContext) -> Result<ActionReport> {
        let mut report = ActionReport::default();

        collect_garbage(&self.host, &mut report).await;
        tokio::time::sleep(ctx.pause).await;

        trim_pools(&self.host, &mut report);
        unload_resources(&self.host, &mut report);
        shrink_caches(&self.host, 1.0, &mut report);
        tokio::time::sleep(ctx.pause).await;

        collect_garbage(&self.host, &mut report).await;
        Ok(report)
    }
}

/// Drops snapshots older than the detectors ever look at
pub struct CompactHistory {
    history: SharedHistory,
    keep: usize,
}

#[async_trait]
impl CleanupAction for CompactHistory {
    async fn execute(&self, _ctx: &CleanupContext) -> Result<ActionReport> {
        let dropped = self.history.write().compact(self.keep);
        debug!(dropped, keep = self.keep, "Compacted snapshot history");

        let mut report = ActionReport::default();
        if dropped == 0 {
            report.push(SubOperation::failed("history.compact", "nothing to compact"));
        } else {
            report.push(SubOperation::succeeded(
                "history.compact",
                dropped as f64 * SNAPSHOT_FOOTPRINT_MB,
            ));
        }
        Ok(report)
    }
}

/// The built-in operation registry
pub fn builtin_operations(
    host: &HostCollaborators,
    history: SharedHistory,
    keep_snapshots: usize,
) -> Vec<(CleanupOperation, Arc<dyn CleanupAction>)> {
    vec![
        (
            CleanupOperation::new("emergency_full_release", CleanupCategory::Emergency, 0, 200.0),
            Arc::new(EmergencyFullRelease { host: host.clone() }),
        ),
        (
            CleanupOperation::new("collect_garbage", CleanupCategory::GarbageCollection, 10, 50.0),
            Arc::new(CollectGarbage { host: host.clone() }),
        ),
        (
            CleanupOperation::new("trim_object_pools", CleanupCategory::ObjectPool, 20, 20.0),
            Arc::new(TrimObjectPools { host: host.clone() }),
        ),
        (
            CleanupOperation::new("unload_unused_resources", CleanupCategory::Resources, 30, 40.0),
            Arc::new(UnloadUnusedResources { host: host.clone() }),
        ),
        (
            CleanupOperation::new("purge_expired_cache", CleanupCategory::Cache, 40, 10.0),
            Arc::new(PurgeExpiredCache { host: host.clone() }),
        ),
        (
            CleanupOperation::new("shrink_caches", CleanupCategory::Cache, 45, 25.0),
            Arc::new(ShrinkCaches { host: host.clone() }),
        ),
        (
            CleanupOperation::new("compact_history", CleanupCategory::Preventive, 90, 1.0),
            Arc::new(CompactHistory {
                history,
                keep: keep_snapshots.max(1),
            }),
        ),
    ]
}

/// Snapshots kept through compaction: the detection window, or half the
/// buffer if that is larger
pub fn snapshots_to_keep(analysis_window: usize, history_capacity: usize) -> usize {
    analysis_window.max(history_capacity / 2).max(1)
}

/// Collaborators backed by a [`SimulatedMetricsProvider`]: every call
/// releases a slice of the simulated heap
pub struct SimulatedHost {
    provider: Arc<SimulatedMetricsProvider>,
}

impl SimulatedHost {
    pub fn new(provider: Arc<SimulatedMetricsProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl GarbageCollector for SimulatedHost {
    async fn collect(&self) -> Result<f64> {
        self.provider.record_collection();
        Ok(self.provider.release(15.0))
    }
}

impl ObjectPoolRegistry for SimulatedHost {
    fn pool_names(&self) -> Vec<String> {
        vec!["projectiles".to_string(), "particles".to_string()]
    }

    fn trim_pool(&self, _name: &str) -> Result<f64> {
        Ok(self.provider.release(4.0))
    }
}

impl ResourceRegistry for SimulatedHost {
    fn unload_unused(&self) -> Result<f64> {
        Ok(self.provider.release(10.0))
    }
}

impl CacheRegistry for SimulatedHost {
    fn cache_names(&self) -> Vec<String> {
        vec!["textures".to_string()]
    }

    fn purge_expired(&self, _name: &str) -> Result<f64> {
        Ok(self.provider.release(2.0))
    }

    fn shrink(&self, _name: &str, fraction: f64) -> Result<f64> {
        Ok(self.provider.release(20.0 * fraction.clamp(0.0, 1.0)))
    }
}

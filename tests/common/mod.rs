#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use memsentinel::error::Result;
use memsentinel::monitoring::{MemoryUsage, ScriptedMetricsProvider, Snapshot};
use memsentinel::optimization::{ActionReport, CleanupAction, CleanupContext, SubOperation};
use memsentinel::{Config, MemoryHealthMonitor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed origin so timestamps are reproducible
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn snapshot_at(at: DateTime<Utc>, total_mb: f64) -> Snapshot {
    Snapshot::new(at, MemoryUsage::new(total_mb, total_mb * 0.8, total_mb * 0.2))
}

/// `count` snapshots one minute apart, growing `mb_per_min` from `base_mb`
pub fn minute_ramp(start: DateTime<Utc>, count: usize, base_mb: f64, mb_per_min: f64) -> Vec<Snapshot> {
    (0..count)
        .map(|i| {
            snapshot_at(
                start + Duration::minutes(i as i64),
                base_mb + mb_per_min * i as f64,
            )
        })
        .collect()
}

/// Monitor over a scripted provider that keeps answering `total_mb`
pub fn scripted_monitor(config: Config, total_mb: f64) -> MemoryHealthMonitor {
    MemoryHealthMonitor::builder(config)
        .provider(Arc::new(ScriptedMetricsProvider::from_totals(&[total_mb])))
        .build()
        .unwrap()
}

/// Cleanup action that counts invocations and reports a fixed gain
pub struct CountingAction {
    pub calls: AtomicU64,
    pub freed_mb: f64,
}

impl CountingAction {
    pub fn new(freed_mb: f64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            freed_mb,
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CleanupAction for CountingAction {
    async fn execute(&self, _ctx: &CleanupContext) -> Result<ActionReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut report = ActionReport::default();
        report.push(SubOperation::succeeded("counted", self.freed_mb));
        Ok(report)
    }
}

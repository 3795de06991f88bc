use crate::error::{Error, Result};
use crate::monitoring::history::SharedHistory;
use crate::monitoring::provider::MetricsProvider;
use crate::monitoring::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters kept by the collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorStats {
    pub samples_collected: u64,
    /// Ticks skipped because the memory reading failed
    pub sampling_failures: u64,
    /// Secondary readings replaced with defaults
    pub degraded_readings: u64,
}

/// Samples the metrics provider into immutable snapshots.
///
/// A failed memory read skips the tick; failed secondary reads degrade to
/// zero/empty values. Neither stops collection.
pub struct SnapshotCollector {
    provider: Arc<dyn MetricsProvider>,
    history: SharedHistory,
    samples_collected: AtomicU64,
    sampling_failures: AtomicU64,
    degraded_readings: AtomicU64,
}

impl SnapshotCollector {
    pub fn new(provider: Arc<dyn MetricsProvider>, history: SharedHistory) -> Self {
        Self {
            provider,
            history,
            samples_collected: AtomicU64::new(0),
            sampling_failures: AtomicU64::new(0),
            degraded_readings: AtomicU64::new(0),
        }
    }

    /// Take one sample and append it to history
    pub fn collect(&self, now: DateTime<Utc>) -> Result<Snapshot> {
        let memory = match self.provider.current_memory_usage() {
            Ok(memory) => memory,
            Err(e) => {
                let failures = self.sampling_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(failures, "Skipping sample, memory reading failed: {}", e);
                return Err(match e {
                    Error::Sampling(_) => e,
                    other => Error::Sampling(other.to_string()),
                });
            }
        };

        let object_counts = self.or_default("live object counts", self.provider.live_object_counts());
        let frame_rate = self.or_default("frame rate", self.provider.current_frame_rate());
        let type_counts = self.or_default("type counts", self.provider.type_counts());
        let collection_count = self.or_default("collection count", self.provider.collection_count());

        let snapshot = Snapshot::new(now, memory)
            .with_object_counts(object_counts)
            .with_frame_rate(frame_rate)
            .with_type_counts(type_counts)
            .with_collection_count(collection_count);

        self.history.write().push(snapshot.clone());
        self.samples_collected.fetch_add(1, Ordering::Relaxed);

        debug!(total_mb = snapshot.total_mb(), "Collected snapshot");
        Ok(snapshot)
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            samples_collected: self.samples_collected.load(Ordering::Relaxed),
            sampling_failures: self.sampling_failures.load(Ordering::Relaxed),
            degraded_readings: self.degraded_readings.load(Ordering::Relaxed),
        }
    }

    pub fn provider(&self) -> &Arc<dyn MetricsProvider> {
        &self.provider
    }

    fn or_default<T: Default>(&self, what: &str, reading: Result<T>) -> T {
        reading.unwrap_or_else(|e| {
            self.degraded_readings.fetch_add(1, Ordering::Relaxed);
            debug!("Using default {}: {}", what, e);
            T::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::history::HistoryBuffer;
    use crate::monitoring::provider::ScriptedMetricsProvider;
    use crate::monitoring::snapshot::MemoryUsage;

    #[test]
    fn test_failed_read_skips_tick_and_continues() {
        let provider = Arc::new(ScriptedMetricsProvider::new(vec![
            Some(MemoryUsage::new(100.0, 80.0, 20.0)),
            None,
            Some(MemoryUsage::new(110.0, 88.0, 22.0)),
        ]));
        let history = HistoryBuffer::shared(10);
        let collector = SnapshotCollector::new(provider, Arc::clone(&history));

        let now = Utc::now();
        assert!(collector.collect(now).is_ok());
        assert!(matches!(collector.collect(now), Err(Error::Sampling(_))));
        assert!(collector.collect(now).is_ok());

        let stats = collector.stats();
        assert_eq!(stats.samples_collected, 2);
        assert_eq!(stats.sampling_failures, 1);
        assert_eq!(history.read().len(), 2);
    }

    #[test]
    fn test_secondary_failures_degrade_to_defaults() {
        let provider =
            Arc::new(ScriptedMetricsProvider::from_totals(&[64.0]).without_frame_rate());
        let history = HistoryBuffer::shared(4);
        let collector = SnapshotCollector::new(provider, history);

        let snapshot = collector.collect(Utc::now()).unwrap();
        assert_eq!(snapshot.frame_rate, 0.0);
        assert_eq!(collector.stats().degraded_readings, 1);
    }
}

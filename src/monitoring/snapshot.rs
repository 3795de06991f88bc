use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time memory reading, in MB
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_mb: f64,
    pub managed_mb: f64,
    pub unmanaged_mb: f64,
}

impl MemoryUsage {
    pub fn new(total_mb: f64, managed_mb: f64, unmanaged_mb: f64) -> Self {
        Self {
            total_mb,
            managed_mb,
            unmanaged_mb,
        }
    }

    /// Share of total memory held outside the managed heap (0 when total is 0)
    pub fn unmanaged_ratio(&self) -> f64 {
        if self.total_mb > 0.0 {
            self.unmanaged_mb / self.total_mb
        } else {
            0.0
        }
    }
}

/// One timestamped sample of memory and object metrics.
///
/// Immutable once built; the history buffer owns it until eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub memory: MemoryUsage,
    /// Live objects by category (entities, pooled objects, assets, ...)
    pub object_counts: BTreeMap<String, u64>,
    pub frame_rate: f64,
    /// Free-form per-type counts
    pub type_counts: BTreeMap<String, u64>,
    /// Cumulative collection events observed by the host
    pub collection_count: u64,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>, memory: MemoryUsage) -> Self {
        Self {
            timestamp,
            memory,
            object_counts: BTreeMap::new(),
            frame_rate: 0.0,
            type_counts: BTreeMap::new(),
            collection_count: 0,
        }
    }

    pub fn with_object_counts(mut self, counts: BTreeMap<String, u64>) -> Self {
        self.object_counts = counts;
        self
    }

    pub fn with_type_counts(mut self, counts: BTreeMap<String, u64>) -> Self {
        self.type_counts = counts;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_collection_count(mut self, count: u64) -> Self {
        self.collection_count = count;
        self
    }

    /// The primary metric every detector works on
    pub fn total_mb(&self) -> f64 {
        self.memory.total_mb
    }

    pub fn total_objects(&self) -> u64 {
        self.object_counts.values().sum()
    }
}

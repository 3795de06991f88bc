use crate::monitoring::snapshot::Snapshot;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// History shared between the collector (single writer) and detectors (readers)
pub type SharedHistory = Arc<RwLock<HistoryBuffer>>;

/// Fixed-capacity, insertion-ordered snapshot history.
/// Like a revolving door: once full, every push evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    buffer: VecDeque<Snapshot>,
    capacity: usize,
    total_pushed: u64,
}

impl HistoryBuffer {
    /// Capacity is clamped to at least one entry
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            total_pushed: 0,
        }
    }

    pub fn shared(capacity: usize) -> SharedHistory {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    /// Append a snapshot, returning the evicted one if the buffer was full
    pub fn push(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        self.total_pushed += 1;

        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(snapshot);
        evicted
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.buffer.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.buffer.iter()
    }

    /// Copy of the most recent `count` snapshots, oldest first
    pub fn recent(&self, count: usize) -> Vec<Snapshot> {
        let skip = self.buffer.len().saturating_sub(count);
        self.buffer.iter().skip(skip).cloned().collect()
    }

    /// Primary metric of the most recent `count` snapshots, oldest first
    pub fn recent_totals(&self, count: usize) -> Vec<f64> {
        let skip = self.buffer.len().saturating_sub(count);
        self.buffer.iter().skip(skip).map(Snapshot::total_mb).collect()
    }

    /// Drop all but the most recent `keep` snapshots and release spare
    /// capacity; returns how many were dropped
    pub fn compact(&mut self, keep: usize) -> usize {
        let excess = self.buffer.len().saturating_sub(keep);
        self.buffer.drain(..excess);
        self.buffer.shrink_to_fit();
        excess
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::snapshot::MemoryUsage;
    use chrono::Utc;

    fn snap(total: f64) -> Snapshot {
        Snapshot::new(Utc::now(), MemoryUsage::new(total, total, 0.0))
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut history = HistoryBuffer::new(3);
        for total in [1.0, 2.0, 3.0] {
            assert!(history.push(snap(total)).is_none());
        }
        assert!(history.is_full());

        let evicted = history.push(snap(4.0)).unwrap();
        assert_eq!(evicted.total_mb(), 1.0);
        assert_eq!(history.len(), 3);
        assert_eq!(history.recent_totals(10), vec![2.0, 3.0, 4.0]);
        assert_eq!(history.total_pushed(), 4);
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut history = HistoryBuffer::new(10);
        for total in 0..6 {
            history.push(snap(total as f64));
        }
        let tail: Vec<f64> = history.recent(2).iter().map(Snapshot::total_mb).collect();
        assert_eq!(tail, vec![4.0, 5.0]);
        assert_eq!(history.latest().unwrap().total_mb(), 5.0);
    }

    #[test]
    fn test_compact_keeps_tail() {
        let mut history = HistoryBuffer::new(10);
        for total in 0..8 {
            history.push(snap(total as f64));
        }
        assert_eq!(history.compact(3), 5);
        assert_eq!(history.recent_totals(10), vec![5.0, 6.0, 7.0]);
        assert_eq!(history.compact(3), 0);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut history = HistoryBuffer::new(0);
        history.push(snap(1.0));
        history.push(snap(2.0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }
}

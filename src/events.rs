//! Outbound notifications
//!
//! Every push-model notification goes through one broadcast channel.
//! Publishing never blocks; with no subscribers the event is counted as
//! undelivered and dropped. Slow subscribers observe `Lagged` from tokio.

use crate::monitoring::alerting::Alert;
use crate::monitoring::leak::ConfirmationChange;
use crate::monitoring::patterns::Pattern;
use crate::monitoring::pressure::LevelChange;
use crate::monitoring::trend::TrendChange;
use crate::optimization::advisor::{Insight, Recommendation};
use crate::optimization::cleanup::CleanupRun;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    PatternDetected(Pattern),
    PressureLevelChanged(LevelChange),
    TrendChanged {
        change: TrendChange,
        at: DateTime<Utc>,
    },
    LeakConfirmationChanged(ConfirmationChange),
    AlertIssued(Alert),
    CleanupCompleted(CleanupRun),
    EmergencyModeActivated {
        current_mb: f64,
        threshold_mb: f64,
        at: DateTime<Utc>,
    },
    EmergencyModeDeactivated {
        current_mb: f64,
        at: DateTime<Utc>,
    },
    RecommendationsUpdated {
        recommendations: Vec<Recommendation>,
    },
    InsightGenerated(Insight),
}

impl MonitorEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PatternDetected(_) => "pattern_detected",
            Self::PressureLevelChanged(_) => "pressure_level_changed",
            Self::TrendChanged { .. } => "trend_changed",
            Self::LeakConfirmationChanged(_) => "leak_confirmation_changed",
            Self::AlertIssued(_) => "alert_issued",
            Self::CleanupCompleted(_) => "cleanup_completed",
            Self::EmergencyModeActivated { .. } => "emergency_mode_activated",
            Self::EmergencyModeDeactivated { .. } => "emergency_mode_deactivated",
            Self::RecommendationsUpdated { .. } => "recommendations_updated",
            Self::InsightGenerated(_) => "insight_generated",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub published: u64,
    pub undelivered: u64,
}

pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
    published: AtomicU64,
    undelivered: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
            undelivered: AtomicU64::new(0),
        }
    }

    /// Publish to current subscribers; returns how many received it
    pub fn publish(&self, event: MonitorEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(kind, receivers, "Published event");
                receivers
            }
            Err(broadcast::error::SendError(_)) => {
                self.undelivered.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> EventStats {
        EventStats {
            published: self.published.load(Ordering::Relaxed),
            undelivered: self.undelivered.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::pressure::PressureLevel;

    fn level_event() -> MonitorEvent {
        MonitorEvent::PressureLevelChanged(LevelChange {
            from: PressureLevel::Normal,
            to: PressureLevel::High,
            smoothed_mb: 1600.0,
            at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(level_event());
        bus.publish(MonitorEvent::EmergencyModeDeactivated {
            current_mb: 10.0,
            at: Utc::now(),
        });

        assert_eq!(rx.recv().await.unwrap().kind(), "pressure_level_changed");
        assert_eq!(rx.recv().await.unwrap().kind(), "emergency_mode_deactivated");
    }

    #[test]
    fn test_publish_without_subscribers_is_counted() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(level_event()), 0);
        assert_eq!(
            bus.stats(),
            EventStats {
                published: 1,
                undelivered: 1
            }
        );
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let json = serde_json::to_string(&level_event()).unwrap();
        assert!(json.contains("\"event\":\"pressure_level_changed\""));
    }
}

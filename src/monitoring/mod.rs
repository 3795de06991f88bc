//! Sampling and detection: everything upstream of mitigation

pub mod alerting;
pub mod collector;
pub mod history;
pub mod leak;
pub mod patterns;
pub mod pressure;
pub mod provider;
pub mod snapshot;
pub mod trend;

pub use alerting::{Alert, AlertDispatcher, AlertKind, AlertRequest, AlertStats};
pub use collector::{CollectorStats, SnapshotCollector};
pub use history::{HistoryBuffer, SharedHistory};
pub use leak::{ConfirmationChange, ConfirmationOutcome, LeakConfirmationEngine, LeakRecord};
pub use patterns::{DetectionOutcome, Pattern, PatternDetector, PatternType, Severity};
pub use pressure::{LevelChange, PressureLevel, PressureStateMachine, PressureThresholds, PressureUpdate};
#[cfg(feature = "monitoring")]
pub use provider::SystemMetricsProvider;
pub use provider::{
    AbsentMetricsProvider, MetricsProvider, ScriptedMetricsProvider, SimulatedMetricsProvider,
    SimulationProfile,
};
pub use snapshot::{MemoryUsage, Snapshot};
pub use trend::{Trend, TrendAnalyzer, TrendChange};

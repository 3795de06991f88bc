//! memsentinel - runtime memory health monitoring
//!
//! The crate samples host memory telemetry on a fixed cadence and turns it
//! into pressure levels, detected patterns, confirmed leaks, throttled
//! alerts, automated cleanup and ranked optimization advice:
//! - monitoring: snapshots, history, trend, patterns, pressure, leak confirmation, alerts
//! - optimization: cleanup orchestration, Emergency Mode, the advisor and its templates
//! - coordinator: `MemoryHealthMonitor`, which owns the components and their timers
//! - events / reports: push notifications and pull-model summaries
//!
//! Hosts inject a [`MetricsProvider`] and optional cleanup collaborators;
//! nothing in here reaches for global state.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod logging;
pub mod monitoring;
pub mod optimization;
pub mod reports;
pub mod utils;

// Re-export commonly used types for easy access
pub use config::{Config, Environment};
pub use coordinator::{MemoryHealthMonitor, MonitorBuilder, PassOutcome, Subsystem};
pub use error::{Error, ErrorCategory, Result};
pub use events::{EventBus, MonitorEvent};
pub use logging::{init_logging, LoggingConfig};
pub use monitoring::{
    Alert, AlertKind, MemoryUsage, MetricsProvider, Pattern, PatternType, PressureLevel,
    PressureThresholds, Severity, SimulatedMetricsProvider, SimulationProfile, Snapshot, Trend,
};
pub use optimization::{
    CleanupAction, CleanupCategory, CleanupOperation, CleanupRun, HostCollaborators,
    Recommendation, RecommendationStatus, SimulatedHost,
};
pub use reports::{AnalysisReport, LeakReport, OptimizationReport, PressureReport};

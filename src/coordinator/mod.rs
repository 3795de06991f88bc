//! Wiring and scheduling of the memory health components

pub mod health_monitor;

pub use health_monitor::{
    AdvisorySummary, DetectionSummary, MemoryHealthMonitor, MonitorBuilder, PassOutcome,
    PressureSummary, Subsystem,
};

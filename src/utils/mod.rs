//! Utility modules shared by the monitoring and optimization passes

pub mod pass_guard;
pub mod stats;

pub use pass_guard::PassGuard;

use crate::config::CleanupConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmergencyState {
    #[default]
    Inactive,
    Active,
}

/// What the caller should do about the latest reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyAction {
    None,
    /// Just crossed the threshold; run emergency cleanup now
    Activate,
    /// Still active after an insufficient cleanup; run it again
    Retry,
}

/// Outcome of feeding a post-cleanup reading back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyResolution {
    Deactivated,
    StillActive,
}

/// Hard-threshold escalation sub-state.
///
/// Activates at `threshold_mb`; only a post-cleanup reading below
/// `exit_ratio * threshold_mb` deactivates it.
#[derive(Debug, Clone)]
pub struct EmergencyMode {
    threshold_mb: f64,
    exit_ratio: f64,
    retry_interval: Duration,
    state: EmergencyState,
    activated_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    activations: u64,
    insufficient_attempts: u64,
}

impl EmergencyMode {
    pub fn new(config: &CleanupConfig) -> Self {
        Self {
            threshold_mb: config.emergency_threshold_mb,
            exit_ratio: config.emergency_exit_ratio,
            retry_interval: config.level_intervals.critical,
            state: EmergencyState::Inactive,
            activated_at: None,
            last_attempt_at: None,
            resolved_at: None,
            activations: 0,
            insufficient_attempts: 0,
        }
    }

    pub fn state(&self) -> EmergencyState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == EmergencyState::Active
    }

    pub fn threshold_mb(&self) -> f64 {
        self.threshold_mb
    }

    pub fn exit_level_mb(&self) -> f64 {
        self.threshold_mb * self.exit_ratio
    }

    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at
    }

    /// When the last activation was resolved by a sufficient cleanup
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn activations(&self) -> u64 {
        self.activations
    }

    pub fn insufficient_attempts(&self) -> u64 {
        self.insufficient_attempts
    }

    /// Decide what to do about the latest reading, taken at `reading_at`.
    ///
    /// Activation happens here; deactivation only in [`Self::after_cleanup`].
    /// A reading taken at or before the last resolution predates that
    /// cleanup and never re-activates.
    pub fn check(
        &mut self,
        current_mb: f64,
        reading_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EmergencyAction {
        let stale = self.resolved_at.is_some_and(|resolved| reading_at <= resolved);
        match self.state {
            EmergencyState::Inactive if stale => EmergencyAction::None,
            EmergencyState::Inactive if current_mb >= self.threshold_mb => {
                self.state = EmergencyState::Active;
                self.activated_at = Some(now);
                self.last_attempt_at = Some(now);
                self.activations += 1;
                warn!(
                    current_mb,
                    threshold_mb = self.threshold_mb,
                    "Emergency memory mode activated"
                );
                EmergencyAction::Activate
            }
            EmergencyState::Inactive => EmergencyAction::None,
            EmergencyState::Active => {
                let due = match self.last_attempt_at {
                    None => true,
                    Some(last) => (now - last)
                        .to_std()
                        .map(|elapsed| elapsed >= self.retry_interval)
                        .unwrap_or(false),
                };
                if due {
                    self.last_attempt_at = Some(now);
                    EmergencyAction::Retry
                } else {
                    EmergencyAction::None
                }
            }
        }
    }

    /// Feed back the reading taken after an emergency cleanup
    pub fn after_cleanup(&mut self, post_cleanup_mb: f64, now: DateTime<Utc>) -> EmergencyResolution {
        if self.state == EmergencyState::Inactive {
            return EmergencyResolution::Deactivated;
        }

        if post_cleanup_mb < self.exit_level_mb() {
            info!(
                post_cleanup_mb,
                exit_level_mb = self.exit_level_mb(),
                active_for_secs = self
                    .activated_at
                    .map(|at| (now - at).num_seconds())
                    .unwrap_or(0),
                "Emergency memory mode deactivated"
            );
            self.state = EmergencyState::Inactive;
            self.activated_at = None;
            self.last_attempt_at = None;
            self.resolved_at = Some(now);
            EmergencyResolution::Deactivated
        } else {
            self.insufficient_attempts += 1;
            warn!(
                post_cleanup_mb,
                exit_level_mb = self.exit_level_mb(),
                "Emergency cleanup insufficient, staying in emergency mode"
            );
            EmergencyResolution::StillActive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn mode() -> EmergencyMode {
        EmergencyMode::new(&CleanupConfig {
            emergency_threshold_mb: 1000.0,
            ..CleanupConfig::default()
        })
    }

    #[test]
    fn test_activates_at_threshold() {
        let mut mode = mode();
        let now = Utc::now();
        assert_eq!(mode.check(999.0, now, now), EmergencyAction::None);
        assert_eq!(mode.check(1000.0, now, now), EmergencyAction::Activate);
        assert!(mode.is_active());
        assert_eq!(mode.activations(), 1);
    }

    #[test]
    fn test_low_reading_alone_never_deactivates() {
        let mut mode = mode();
        let now = Utc::now();
        mode.check(1200.0, now, now);
        // A low reading outside of cleanup feedback keeps the state
        mode.check(100.0, now, now);
        assert!(mode.is_active());
    }

    #[test]
    fn test_exit_band_is_eighty_percent() {
        let mut mode = mode();
        let now = Utc::now();
        mode.check(1200.0, now, now);

        assert_eq!(mode.after_cleanup(850.0, now), EmergencyResolution::StillActive);
        assert_eq!(mode.insufficient_attempts(), 1);
        assert_eq!(mode.after_cleanup(800.0, now), EmergencyResolution::StillActive);
        assert_eq!(mode.after_cleanup(799.0, now), EmergencyResolution::Deactivated);
        assert!(!mode.is_active());
    }

    #[test]
    fn test_retry_waits_for_critical_interval() {
        let mut mode = mode();
        let t0 = Utc::now();
        mode.check(1200.0, t0, t0);
        mode.after_cleanup(1100.0, t0);

        assert_eq!(mode.check(1100.0, t0, t0 + ChronoDuration::seconds(5)), EmergencyAction::None);
        assert_eq!(mode.check(1100.0, t0, t0 + ChronoDuration::seconds(10)), EmergencyAction::Retry);
    }

    #[test]
    fn test_readings_before_resolution_do_not_reactivate() {
        let mut mode = mode();
        let t0 = Utc::now();
        mode.check(1200.0, t0, t0);
        assert_eq!(mode.after_cleanup(500.0, t0), EmergencyResolution::Deactivated);
        assert_eq!(mode.resolved_at(), Some(t0));

        let later = t0 + ChronoDuration::seconds(1);
        assert_eq!(mode.check(1200.0, t0, later), EmergencyAction::None);
        assert!(!mode.is_active());

        assert_eq!(mode.check(1200.0, later, later), EmergencyAction::Activate);
        assert_eq!(mode.activations(), 2);
    }
}

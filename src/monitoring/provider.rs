//! Metrics providers
//!
//! The monitor only consumes the [`MetricsProvider`] trait. Individual
//! readings may fail; callers substitute zero/empty values for everything
//! except the memory reading itself.

use crate::error::{Error, Result};
use crate::monitoring::snapshot::MemoryUsage;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

/// Source of point-in-time host metrics
pub trait MetricsProvider: Send + Sync {
    fn current_memory_usage(&self) -> Result<MemoryUsage>;

    fn live_object_counts(&self) -> Result<BTreeMap<String, u64>> {
        Ok(BTreeMap::new())
    }

    fn current_frame_rate(&self) -> Result<f64> {
        Ok(0.0)
    }

    fn type_counts(&self) -> Result<BTreeMap<String, u64>> {
        Ok(BTreeMap::new())
    }

    /// Cumulative count of collection events
    fn collection_count(&self) -> Result<u64> {
        Ok(0)
    }
}

/// Process memory readings backed by sysinfo.
///
/// sysinfo can't see inside a managed heap, so resident memory is reported
/// as managed and unmanaged stays at zero.
#[cfg(feature = "monitoring")]
pub struct SystemMetricsProvider {
    system: Mutex<sysinfo::System>,
    pid: sysinfo::Pid,
}

#[cfg(feature = "monitoring")]
impl SystemMetricsProvider {
    pub fn new() -> Result<Self> {
        use sysinfo::SystemExt;

        let pid = sysinfo::get_current_pid()
            .map_err(|e| Error::Sampling(format!("Cannot resolve current pid: {}", e)))?;

        Ok(Self {
            system: Mutex::new(sysinfo::System::new()),
            pid,
        })
    }
}

#[cfg(feature = "monitoring")]
impl MetricsProvider for SystemMetricsProvider {
    fn current_memory_usage(&self) -> Result<MemoryUsage> {
        use sysinfo::{ProcessExt, SystemExt};

        let mut system = self.system.lock();
        if !system.refresh_process(self.pid) {
            return Err(Error::Sampling(format!("Process {} not visible", self.pid)));
        }

        let process = system
            .process(self.pid)
            .ok_or_else(|| Error::Sampling(format!("Process {} not visible", self.pid)))?;

        let resident_mb = process.memory() as f64 / 1024.0 / 1024.0;
        Ok(MemoryUsage::new(resident_mb, resident_mb, 0.0))
    }

    fn current_frame_rate(&self) -> Result<f64> {
        Err(Error::Sampling("Frame rate is not tracked for plain processes".to_string()))
    }
}

/// Stand-in when no provider is available: every memory read fails, so
/// collection keeps ticking and counting failures
pub struct AbsentMetricsProvider;

impl MetricsProvider for AbsentMetricsProvider {
    fn current_memory_usage(&self) -> Result<MemoryUsage> {
        Err(Error::MissingCollaborator("No metrics provider configured".to_string()))
    }
}

/// Shape of the synthetic memory curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationProfile {
    /// Flat usage with small noise
    Steady,
    /// Linear growth at the given rate
    Leak { mb_per_sec: f64 },
    /// Flat usage with occasional large spikes
    Spiky,
    /// Repeating ramp-and-drop cycle
    Sawtooth { period_secs: f64 },
}

impl std::str::FromStr for SimulationProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "steady" => Ok(Self::Steady),
            "leak" => Ok(Self::Leak { mb_per_sec: 2.0 }),
            "spiky" => Ok(Self::Spiky),
            "sawtooth" => Ok(Self::Sawtooth { period_secs: 10.0 }),
            other => Err(Error::Config(format!("Unknown simulation profile: {}", other))),
        }
    }
}

struct SimulationState {
    rng: StdRng,
    released_mb: f64,
    collections: u64,
}

/// Seeded synthetic provider for demos and soak runs.
///
/// Memory follows the profile over wall-clock time since construction;
/// [`SimulatedMetricsProvider::release`] lets simulated cleanup lower it.
pub struct SimulatedMetricsProvider {
    profile: SimulationProfile,
    base_mb: f64,
    started: Instant,
    state: Mutex<SimulationState>,
}

impl SimulatedMetricsProvider {
    pub fn new(profile: SimulationProfile, base_mb: f64, seed: u64) -> Self {
        Self {
            profile,
            base_mb,
            started: Instant::now(),
            state: Mutex::new(SimulationState {
                rng: StdRng::seed_from_u64(seed),
                released_mb: 0.0,
                collections: 0,
            }),
        }
    }

    /// Simulate memory returned to the host; returns the amount actually released
    pub fn release(&self, mb: f64) -> f64 {
        let mut state = self.state.lock();
        let elapsed = self.started.elapsed().as_secs_f64();
        let available = (self.raw_usage(elapsed) - state.released_mb - self.base_mb * 0.5).max(0.0);
        let released = mb.max(0.0).min(available);
        state.released_mb += released;
        released
    }

    /// Simulate one collection event
    pub fn record_collection(&self) {
        self.state.lock().collections += 1;
    }

    fn raw_usage(&self, elapsed_secs: f64) -> f64 {
        match self.profile {
            SimulationProfile::Steady | SimulationProfile::Spiky => self.base_mb,
            SimulationProfile::Leak { mb_per_sec } => self.base_mb + mb_per_sec * elapsed_secs,
            SimulationProfile::Sawtooth { period_secs } => {
                let period = period_secs.max(1.0);
                let phase = (elapsed_secs % period) / period;
                self.base_mb * (1.0 + 0.5 * phase)
            }
        }
    }
}

impl MetricsProvider for SimulatedMetricsProvider {
    fn current_memory_usage(&self) -> Result<MemoryUsage> {
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut state = self.state.lock();

        let noise = state.rng.gen_range(-0.5..0.5);
        let spike = match self.profile {
            SimulationProfile::Spiky if state.rng.gen_bool(0.15) => self.base_mb * 1.2,
            _ => 0.0,
        };

        let total = (self.raw_usage(elapsed) - state.released_mb + noise + spike).max(0.0);
        let unmanaged = total * 0.2;
        Ok(MemoryUsage::new(total, total - unmanaged, unmanaged))
    }

    fn live_object_counts(&self) -> Result<BTreeMap<String, u64>> {
        let usage = self.current_memory_usage()?;
        let mut counts = BTreeMap::new();
        counts.insert("entities".to_string(), (usage.managed_mb * 40.0) as u64);
        counts.insert("pooled_objects".to_string(), 2_000);
        counts.insert("assets".to_string(), (usage.unmanaged_mb * 2.0) as u64);
        Ok(counts)
    }

    fn current_frame_rate(&self) -> Result<f64> {
        let usage = self.current_memory_usage()?;
        // Frame rate sags as the heap grows past the baseline
        let overshoot = (usage.total_mb / self.base_mb.max(1.0) - 1.0).max(0.0);
        Ok((60.0 - overshoot * 20.0).clamp(5.0, 60.0))
    }

    fn collection_count(&self) -> Result<u64> {
        Ok(self.state.lock().collections)
    }
}

/// Replays a fixed sequence of readings; `None` entries fail that read.
///
/// Once exhausted the final entry repeats.
pub struct ScriptedMetricsProvider {
    readings: Mutex<VecDeque<Option<MemoryUsage>>>,
    last: Mutex<Option<MemoryUsage>>,
    object_counts: Mutex<BTreeMap<String, u64>>,
    frame_rate: Option<f64>,
}

impl ScriptedMetricsProvider {
    pub fn new(readings: Vec<Option<MemoryUsage>>) -> Self {
        Self {
            readings: Mutex::new(readings.into()),
            last: Mutex::new(None),
            object_counts: Mutex::new(BTreeMap::new()),
            frame_rate: Some(60.0),
        }
    }

    /// Script of total-memory values that all read successfully
    pub fn from_totals(totals: &[f64]) -> Self {
        Self::new(
            totals
                .iter()
                .map(|&total| Some(MemoryUsage::new(total, total * 0.8, total * 0.2)))
                .collect(),
        )
    }

    pub fn with_object_counts(self, counts: BTreeMap<String, u64>) -> Self {
        *self.object_counts.lock() = counts;
        self
    }

    /// Make every frame rate read fail
    pub fn without_frame_rate(mut self) -> Self {
        self.frame_rate = None;
        self
    }

    pub fn remaining(&self) -> usize {
        self.readings.lock().len()
    }
}

impl MetricsProvider for ScriptedMetricsProvider {
    fn current_memory_usage(&self) -> Result<MemoryUsage> {
        let next = self.readings.lock().pop_front();
        let mut last = self.last.lock();

        match next {
            Some(Some(usage)) => {
                *last = Some(usage);
                Ok(usage)
            }
            Some(None) => Err(Error::Sampling("Scripted read failure".to_string())),
            None => match *last {
                Some(usage) => Ok(usage),
                None => Err(Error::Sampling("Script is empty".to_string())),
            },
        }
    }

    fn live_object_counts(&self) -> Result<BTreeMap<String, u64>> {
        Ok(self.object_counts.lock().clone())
    }

    fn current_frame_rate(&self) -> Result<f64> {
        self.frame_rate
            .ok_or_else(|| Error::Sampling("Frame rate unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_provider_replays_and_repeats() {
        let provider = ScriptedMetricsProvider::new(vec![
            Some(MemoryUsage::new(10.0, 8.0, 2.0)),
            None,
            Some(MemoryUsage::new(20.0, 16.0, 4.0)),
        ]);

        assert_eq!(provider.current_memory_usage().unwrap().total_mb, 10.0);
        assert!(provider.current_memory_usage().is_err());
        assert_eq!(provider.current_memory_usage().unwrap().total_mb, 20.0);
        // Exhausted: last good reading repeats
        assert_eq!(provider.current_memory_usage().unwrap().total_mb, 20.0);
        assert_eq!(provider.remaining(), 0);
    }

    #[test]
    fn test_simulated_release_lowers_usage() {
        let provider = SimulatedMetricsProvider::new(SimulationProfile::Steady, 400.0, 7);
        let before = provider.current_memory_usage().unwrap().total_mb;
        let released = provider.release(50.0);
        let after = provider.current_memory_usage().unwrap().total_mb;

        assert_eq!(released, 50.0);
        assert!(after < before - 40.0);
    }

    #[test]
    fn test_simulation_profile_parsing() {
        assert_eq!("steady".parse::<SimulationProfile>().unwrap(), SimulationProfile::Steady);
        assert!(matches!(
            "leak".parse::<SimulationProfile>().unwrap(),
            SimulationProfile::Leak { .. }
        ));
        assert!("bogus".parse::<SimulationProfile>().is_err());
    }
}

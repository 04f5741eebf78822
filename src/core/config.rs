//! Simulation parameters
//!
//! Every tunable of a run lives in [`SimulationConfig`]. The defaults give a
//! visibly contended system: few resources, many clients, and a deadlock
//! window wide enough for two-resource cycles to form.

use crate::core::types::ProcessId;
use anyhow::{Context, Result, bail, ensure};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// An inclusive range of milliseconds to draw a duration from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DurationRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        DurationRange { min_ms, max_ms }
    }

    /// A range that always yields `ms`
    pub const fn fixed(ms: u64) -> Self {
        DurationRange {
            min_ms: ms,
            max_ms: ms,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min_ms >= self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.random_range(self.min_ms..=self.max_ms))
    }
}

/// Configuration for a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of client processes
    pub num_processes: usize,
    /// Number of lockable resources; fewer resources means more contention
    pub num_resources: usize,
    /// Probability that an operation is a write rather than a read
    pub write_probability: f64,
    /// Probability that a write involves two resources instead of one
    pub multi_resource_probability: f64,
    /// How long a read takes
    pub read_duration: DurationRange,
    /// How long a write holds all of its locks
    pub write_duration: DurationRange,
    /// Pause between the first and second acquisition of a transaction
    pub deadlock_window: DurationRange,
    /// Pause after each completed operation
    pub cooldown: DurationRange,
    /// Upper bound on a single lock request
    pub acquire_timeout_ms: u64,
    /// Time between the start of consecutive snapshots
    pub snapshot_period_ms: u64,
    /// How long the detector waits for markers to reach every process
    pub propagation_window_ms: u64,
    /// Process that starts every snapshot; defaults to the lowest id
    pub initiator: Option<ProcessId>,
    /// Stop after this many snapshots even without a deadlock
    pub max_snapshots: Option<u64>,
    /// Seed for the random workload; runs are unseeded by default
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            num_processes: 10,
            num_resources: 4,
            write_probability: 0.5,
            multi_resource_probability: 0.4,
            read_duration: DurationRange::new(2000, 5000),
            write_duration: DurationRange::new(3000, 6000),
            deadlock_window: DurationRange::new(100, 400),
            cooldown: DurationRange::new(1000, 2000),
            acquire_timeout_ms: 1000,
            snapshot_period_ms: 5000,
            propagation_window_ms: 3000,
            initiator: None,
            max_snapshots: None,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`SimulationConfig::validate`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SimulationConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters describe a runnable simulation
    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_processes > 0, "num_processes must be at least 1");
        ensure!(self.num_resources > 0, "num_resources must be at least 1");

        for (name, p) in [
            ("write_probability", self.write_probability),
            ("multi_resource_probability", self.multi_resource_probability),
        ] {
            ensure!((0.0..=1.0).contains(&p), "{name} must be within [0, 1], got {p}");
        }

        for (name, range) in [
            ("read_duration", self.read_duration),
            ("write_duration", self.write_duration),
            ("deadlock_window", self.deadlock_window),
            ("cooldown", self.cooldown),
        ] {
            ensure!(
                range.min_ms <= range.max_ms,
                "{name} has min_ms {} above max_ms {}",
                range.min_ms,
                range.max_ms
            );
        }

        ensure!(self.acquire_timeout_ms > 0, "acquire_timeout_ms must be positive");
        // A process blocked in an acquire answers markers only after it returns
        ensure!(
            self.propagation_window_ms > self.acquire_timeout_ms,
            "propagation_window_ms ({}) must exceed acquire_timeout_ms ({})",
            self.propagation_window_ms,
            self.acquire_timeout_ms
        );

        if let Some(initiator) = self.initiator
            && initiator >= self.num_processes
        {
            bail!(
                "initiator {initiator} is not a process id (have {} processes)",
                self.num_processes
            );
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn snapshot_period(&self) -> Duration {
        Duration::from_millis(self.snapshot_period_ms)
    }

    pub fn propagation_window(&self) -> Duration {
        Duration::from_millis(self.propagation_window_ms)
    }

    pub fn initiator(&self) -> ProcessId {
        self.initiator.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_probability() {
        let config = SimulationConfig {
            write_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_propagation_window() {
        let config = SimulationConfig {
            acquire_timeout_ms: 1000,
            propagation_window_ms: 1000,
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("propagation_window_ms"));
    }

    #[test]
    fn test_rejects_unknown_initiator() {
        let config = SimulationConfig {
            num_processes: 2,
            initiator: Some(2),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"num_processes": 3, "cooldown": {{"min_ms": 5, "max_ms": 10}}, "seed": 42}}"#
        )
        .unwrap();

        let config = SimulationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.num_processes, 3);
        assert_eq!(config.cooldown, DurationRange::new(5, 10));
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.num_resources, 4);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SimulationConfig::from_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn test_duration_range_sampling() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = DurationRange::new(10, 20);
        for _ in 0..100 {
            let d = range.sample(&mut rng);
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(
            DurationRange::fixed(5).sample(&mut rng),
            Duration::from_millis(5)
        );
    }
}

//! Sources of client actions
//!
//! A process never decides for itself what to do next; it asks its
//! [`Workload`]. Production runs use [`RandomWorkload`]; tests use
//! [`ScriptedWorkload`] so that acquisition order is fully determined.

use crate::core::config::{DurationRange, SimulationConfig};
use crate::core::types::{ProcessId, ResourceId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;

/// One client operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Simulated read: a delay with no locking
    Read {
        resource: ResourceId,
        duration: Duration,
    },
    /// Write transaction: acquire `resources` in order, hold all of them for
    /// `duration`, then release in reverse order
    Write {
        resources: Vec<ResourceId>,
        duration: Duration,
    },
}

/// Decides what a process does next
pub trait Workload: Send {
    /// The next operation, or `None` to idle for one cooldown
    fn next_action(&mut self) -> Option<Action>;

    /// Pause between the first and second acquisition of a transaction
    fn deadlock_window(&mut self) -> Duration;

    /// Pause after a completed operation
    fn cooldown(&mut self) -> Duration;
}

/// Builds the workload for each process of a simulation
pub type WorkloadFactory = Box<dyn Fn(ProcessId) -> Box<dyn Workload> + Send>;

/// Random reads and one- or two-resource writes
pub struct RandomWorkload {
    rng: StdRng,
    num_resources: usize,
    write_probability: f64,
    multi_resource_probability: f64,
    read_duration: DurationRange,
    write_duration: DurationRange,
    deadlock_window: DurationRange,
    cooldown: DurationRange,
}

impl RandomWorkload {
    /// Create the workload of `process_id`
    ///
    /// With a configured seed every process gets its own deterministic stream
    /// (`seed + process_id`).
    pub fn new(process_id: ProcessId, config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(process_id as u64)),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        RandomWorkload {
            rng,
            num_resources: config.num_resources,
            write_probability: config.write_probability,
            multi_resource_probability: config.multi_resource_probability,
            read_duration: config.read_duration,
            write_duration: config.write_duration,
            deadlock_window: config.deadlock_window,
            cooldown: config.cooldown,
        }
    }

    /// A factory producing a [`RandomWorkload`] per process
    pub fn factory(config: &SimulationConfig) -> WorkloadFactory {
        let config = config.clone();
        Box::new(move |process_id| -> Box<dyn Workload> {
            Box::new(RandomWorkload::new(process_id, &config))
        })
    }
}

impl Workload for RandomWorkload {
    fn next_action(&mut self) -> Option<Action> {
        if self.num_resources == 0 {
            return None;
        }

        if !self.rng.random_bool(self.write_probability) {
            return Some(Action::Read {
                resource: self.rng.random_range(0..self.num_resources),
                duration: self.read_duration.sample(&mut self.rng),
            });
        }

        let count = if self.num_resources >= 2
            && self.rng.random_bool(self.multi_resource_probability)
        {
            2
        } else {
            1
        };
        let resources =
            rand::seq::index::sample(&mut self.rng, self.num_resources, count).into_vec();

        Some(Action::Write {
            resources,
            duration: self.write_duration.sample(&mut self.rng),
        })
    }

    fn deadlock_window(&mut self) -> Duration {
        self.deadlock_window.sample(&mut self.rng)
    }

    fn cooldown(&mut self) -> Duration {
        self.cooldown.sample(&mut self.rng)
    }
}

/// Replays a fixed list of actions, then idles
pub struct ScriptedWorkload {
    actions: VecDeque<Action>,
    deadlock_window: Duration,
    cooldown: Duration,
}

impl ScriptedWorkload {
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        ScriptedWorkload {
            actions: actions.into_iter().collect(),
            deadlock_window: Duration::from_millis(100),
            cooldown: Duration::from_millis(20),
        }
    }

    /// A workload that never does anything
    pub fn idle() -> Self {
        Self::new([])
    }

    pub fn with_deadlock_window(mut self, window: Duration) -> Self {
        self.deadlock_window = window;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

impl Workload for ScriptedWorkload {
    fn next_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    fn deadlock_window(&mut self) -> Duration {
        self.deadlock_window
    }

    fn cooldown(&mut self) -> Duration {
        self.cooldown
    }
}

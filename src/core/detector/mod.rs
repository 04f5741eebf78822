pub mod deadlock_handling;

use crate::core::graph::WaitForGraph;
use crate::core::logger::{Event, EventLogger};
use crate::core::process::Registry;
use crate::core::shutdown::Shutdown;
use crate::core::types::{DeadlockInfo, DetectorState, GlobalState, ProcessId, SnapshotId};
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with the details of a detected deadlock
pub type DeadlockCallback = Box<dyn Fn(DeadlockInfo) + Send>;

/// Timing and scope of the detector
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Time between the start of consecutive snapshots
    pub snapshot_period: Duration,
    /// How long markers get to reach every process
    pub propagation_window: Duration,
    /// The process every snapshot starts at
    pub initiator: ProcessId,
    /// Stop after this many snapshots even without a deadlock
    pub max_snapshots: Option<u64>,
}

/// The local states gathered for one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub snapshot_id: SnapshotId,
    pub states: GlobalState,
    /// Processes that had not recorded this snapshot when it was collected
    pub missing: Vec<ProcessId>,
}

impl SnapshotRecord {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Everything derived from one snapshot
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub record: SnapshotRecord,
    pub graph: WaitForGraph,
    pub deadlock: Option<DeadlockInfo>,
}

/// Summary of a detector run
#[derive(Debug, Clone, Default)]
pub struct DetectorReport {
    pub snapshots: u64,
    pub deadlock: Option<DeadlockInfo>,
}

/// Periodic global-snapshot deadlock detector
///
/// The Detector never inspects live process state. It asks one process to
/// start a snapshot, gives the markers time to spread, then reads whatever
/// each process recorded.
///
/// # How it works
///
/// 1. Allocate the next snapshot id and send `Initiate` to the initiator
/// 2. Sleep for the propagation window
/// 3. Read each process's recorded state under that process's snapshot lock
/// 4. Build the wait-for graph and look for a cycle
/// 5. On a cycle: report it, stop every process and raise shutdown
///
/// A process that has not recorded the snapshot by step 3 is left out of the
/// cut. A deadlock involving it may be missed this round and will be seen by
/// a later snapshot.
pub struct Detector {
    registry: Arc<Registry>,
    shutdown: Shutdown,
    logger: Arc<EventLogger>,
    config: DetectorConfig,
    callback: Option<DeadlockCallback>,
    /// Last snapshot id handed out; ids start at 1
    last_snapshot_id: SnapshotId,
    state: DetectorState,
}

impl Detector {
    pub fn new(
        registry: Arc<Registry>,
        shutdown: Shutdown,
        logger: Arc<EventLogger>,
        config: DetectorConfig,
    ) -> Self {
        Detector {
            registry,
            shutdown,
            logger,
            config,
            callback: None,
            last_snapshot_id: 0,
            state: DetectorState::Idle,
        }
    }

    /// Set callback to be invoked when a deadlock is detected
    pub fn set_deadlock_callback<F>(&mut self, callback: F)
    where
        F: Fn(DeadlockInfo) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Number of snapshots started so far
    pub fn snapshots_taken(&self) -> u64 {
        self.last_snapshot_id
    }

    /// Take snapshots every period until a deadlock, shutdown, or the
    /// snapshot limit
    ///
    /// Whatever ends the loop, the detector leaves shutdown raised so that
    /// every process winds down with it.
    pub fn run(mut self) -> DetectorReport {
        let mut report = DetectorReport::default();

        loop {
            if let Some(max) = self.config.max_snapshots
                && self.last_snapshot_id >= max
            {
                break;
            }
            if self.shutdown.sleep(self.config.snapshot_period) {
                break;
            }
            let Some(outcome) = self.run_snapshot() else {
                break;
            };
            if let Some(info) = outcome.deadlock {
                report.deadlock = Some(info);
                break;
            }
        }

        report.snapshots = self.last_snapshot_id;
        self.registry.stop_all();
        self.shutdown.trigger();
        report
    }

    /// Run one complete snapshot and analysis
    ///
    /// # Returns
    /// `None` if shutdown was raised while markers were propagating
    pub fn run_snapshot(&mut self) -> Option<SnapshotOutcome> {
        let snapshot_id = self.start_snapshot();

        if self.shutdown.sleep(self.config.propagation_window) {
            self.state = DetectorState::Idle;
            return None;
        }

        let record = self.collect_global_state(snapshot_id);
        Some(self.analyze(record))
    }

    /// Allocate the next snapshot id and hand it to the initiator
    pub fn start_snapshot(&mut self) -> SnapshotId {
        self.last_snapshot_id += 1;
        let snapshot_id = self.last_snapshot_id;
        self.state = DetectorState::SnapshotInProgress;

        let initiator = self.config.initiator;
        self.logger.log_detector(Event::SnapshotStarted {
            snapshot_id,
            initiator,
        });

        match self.registry.get(initiator) {
            Some(handle) => handle.initiate_snapshot(snapshot_id),
            None => {
                // Fall back to the lowest id rather than skipping the round
                if let Some(handle) = self.registry.iter().next() {
                    handle.initiate_snapshot(snapshot_id);
                }
            }
        }
        snapshot_id
    }

    /// Gather every recorded local state for `snapshot_id`
    ///
    /// Only per-process snapshot locks are taken, one at a time.
    pub fn collect_global_state(&self, snapshot_id: SnapshotId) -> SnapshotRecord {
        let mut states = GlobalState::new();
        let mut missing = Vec::new();

        for handle in self.registry.iter() {
            match handle.collect_local_state(snapshot_id) {
                Some(state) => {
                    states.insert(handle.id(), state);
                }
                None => missing.push(handle.id()),
            }
        }

        self.logger.log_detector(Event::GlobalStateCollected {
            snapshot_id,
            states: states.clone(),
            missing: missing.clone(),
        });

        SnapshotRecord {
            snapshot_id,
            states,
            missing,
        }
    }

    /// Build the wait-for graph of `record` and act on any cycle
    pub fn analyze(&mut self, record: SnapshotRecord) -> SnapshotOutcome {
        self.state = DetectorState::Analyzing;
        let snapshot_id = record.snapshot_id;

        let graph = WaitForGraph::from_global_state(&record.states);
        self.logger.log_detector(Event::WaitForGraphBuilt {
            snapshot_id,
            graph: graph.edges().clone(),
        });

        let deadlock = graph.detect_cycle().map(|cycle| {
            let info = deadlock_handling::extract_deadlock_info(&record, &graph, cycle);
            self.handle_deadlock(info.clone());
            info
        });

        if deadlock.is_none() {
            self.logger.log_detector(Event::NoDeadlock { snapshot_id });
            for handle in self.registry.iter() {
                handle.discard_snapshot(snapshot_id);
            }
            self.state = DetectorState::Idle;
        }

        SnapshotOutcome {
            record,
            graph,
            deadlock,
        }
    }
}

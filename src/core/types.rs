use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Process identifier type
///
/// Uniquely identifies a simulated client. Ids are assigned `0..N` when the
/// simulation is built and never reused.
pub type ProcessId = usize;

/// Resource identifier type
///
/// Uniquely identifies a lockable resource (a "table").
pub type ResourceId = usize;

/// Snapshot identifier type
///
/// Allocated only by the detector; strictly increasing, starting at 1.
pub type SnapshotId = u64;

/// A process's state as captured at the moment it first saw a snapshot marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    /// Resources the process owned when the state was recorded
    pub held: BTreeSet<ResourceId>,
    /// The resource the process was blocked on, if any
    pub waiting: Option<ResourceId>,
}

impl LocalState {
    pub fn new(held: impl IntoIterator<Item = ResourceId>, waiting: Option<ResourceId>) -> Self {
        LocalState {
            held: held.into_iter().collect(),
            waiting,
        }
    }

    /// An idle process: holds nothing and waits on nothing
    pub fn idle() -> Self {
        Self::default()
    }
}

/// The collection of local states making up one global cut
///
/// Ordered by process id so that everything derived from it is reproducible.
pub type GlobalState = BTreeMap<ProcessId, LocalState>;

/// Result of a bounded lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquireOutcome {
    /// The caller is now the resource's owner
    Granted,
    /// The timeout elapsed; nothing changed
    TimedOut,
    /// The lock was granted while shutting down and was handed back immediately
    Abandoned,
    /// No such resource
    Unknown,
}

/// Result of a release request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseOutcome {
    /// The caller owned the resource and no longer does
    Released,
    /// The caller was not the owner; nothing changed
    NotOwner,
    /// No such resource; nothing changed
    Unknown,
}

/// Lifecycle of a client process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessState {
    #[default]
    Idle,
    ChoosingAction,
    Reading,
    Acquiring,
    Waiting,
    Holding,
    Releasing,
    Stopped,
}

/// Lifecycle of the deadlock detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DetectorState {
    #[default]
    Idle,
    SnapshotInProgress,
    Analyzing,
    Terminated,
}

/// Represents the result of a deadlock detection
///
/// This structure is handed to the deadlock callback and written to the event
/// log as the terminal record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlockInfo {
    /// Snapshot in which the cycle was found
    pub snapshot_id: SnapshotId,

    /// The closed cycle of processes
    ///
    /// The first and last entries are the same process. If process 1 waits on
    /// process 2 and process 2 waits on process 1, the cycle is `[1, 2, 1]`.
    pub process_cycle: Vec<ProcessId>,

    /// The resource each process in the cycle was waiting on, as `(process_id, resource_id)`
    pub process_waiting_for_resources: Vec<(ProcessId, ResourceId)>,

    /// The full wait-for graph of the snapshot
    pub wait_for_graph: BTreeMap<ProcessId, Vec<ProcessId>>,

    /// ISO-8601 formatted timestamp indicating when the deadlock was detected
    pub timestamp: String,
}

impl DeadlockInfo {
    /// Distinct processes in the cycle, in cycle order
    pub fn processes(&self) -> &[ProcessId] {
        match self.process_cycle.len() {
            0 => &[],
            n => &self.process_cycle[..n - 1],
        }
    }
}

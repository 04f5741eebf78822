use crate::core::types::{
    DeadlockInfo, GlobalState, LocalState, ProcessId, ReleaseOutcome, ResourceId, SnapshotId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Who produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Simulation,
    Detector,
    Process(ProcessId),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Simulation => write!(f, "Simulation"),
            Actor::Detector => write!(f, "Detector"),
            Actor::Process(id) => write!(f, "Process-{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        };
        f.pad(s)
    }
}

/// Everything that can happen during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    SimulationStarted {
        processes: usize,
        resources: usize,
    },
    SimulationFinished {
        deadlocked: bool,
        snapshots: u64,
    },
    ProcessStarted,
    ProcessStopped,
    Read {
        resource: ResourceId,
        duration_ms: u64,
    },
    GoalSet {
        resources: Vec<ResourceId>,
    },
    Attempt {
        resource: ResourceId,
    },
    Acquired {
        resource: ResourceId,
    },
    TimedOut {
        resource: ResourceId,
    },
    Abandoned {
        resource: ResourceId,
    },
    Released {
        resource: ResourceId,
    },
    ReleaseRejected {
        resource: ResourceId,
        outcome: ReleaseOutcome,
    },
    SnapshotInitiated {
        snapshot_id: SnapshotId,
    },
    MarkerSent {
        snapshot_id: SnapshotId,
        to: ProcessId,
    },
    MarkerReceived {
        snapshot_id: SnapshotId,
        from: ProcessId,
        duplicate: bool,
    },
    StateRecorded {
        snapshot_id: SnapshotId,
        state: LocalState,
    },
    SnapshotStarted {
        snapshot_id: SnapshotId,
        initiator: ProcessId,
    },
    GlobalStateCollected {
        snapshot_id: SnapshotId,
        states: GlobalState,
        missing: Vec<ProcessId>,
    },
    WaitForGraphBuilt {
        snapshot_id: SnapshotId,
        graph: BTreeMap<ProcessId, Vec<ProcessId>>,
    },
    NoDeadlock {
        snapshot_id: SnapshotId,
    },
    Deadlock {
        info: DeadlockInfo,
    },
}

impl Event {
    pub fn severity(&self) -> Severity {
        match self {
            Event::TimedOut { .. } | Event::ReleaseRejected { .. } => Severity::Warn,
            Event::GlobalStateCollected { missing, .. } if !missing.is_empty() => Severity::Warn,
            Event::Deadlock { .. } => Severity::Error,
            _ => Severity::Info,
        }
    }
}

fn join_ids(ids: &[usize]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SimulationStarted {
                processes,
                resources,
            } => write!(
                f,
                "starting simulation with {processes} processes and {resources} resources"
            ),
            Event::SimulationFinished {
                deadlocked,
                snapshots,
            } => write!(
                f,
                "simulation finished after {snapshots} snapshot(s), deadlocked: {deadlocked}"
            ),
            Event::ProcessStarted => write!(f, "started"),
            Event::ProcessStopped => write!(f, "shutting down"),
            Event::Read {
                resource,
                duration_ms,
            } => write!(f, "READ from Resource-{resource} for {duration_ms}ms"),
            Event::GoalSet { resources } => {
                write!(f, "new goal: WRITE to resources [{}]", join_ids(resources))
            }
            Event::Attempt { resource } => write!(f, "attempting lock on Resource-{resource}"),
            Event::Acquired { resource } => write!(f, "acquired lock on Resource-{resource}"),
            Event::TimedOut { resource } => write!(
                f,
                "could not acquire Resource-{resource}, will keep trying"
            ),
            Event::Abandoned { resource } => write!(
                f,
                "abandoned Resource-{resource}: shutdown observed after grant"
            ),
            Event::Released { resource } => write!(f, "released lock on Resource-{resource}"),
            Event::ReleaseRejected { resource, outcome } => write!(
                f,
                "refused to release Resource-{resource}: {outcome:?}"
            ),
            Event::SnapshotInitiated { snapshot_id } => {
                write!(f, "initiating snapshot {snapshot_id}")
            }
            Event::MarkerSent { snapshot_id, to } => {
                write!(f, "sent marker for snapshot {snapshot_id} to Process-{to}")
            }
            Event::MarkerReceived {
                snapshot_id,
                from,
                duplicate,
            } => {
                if *duplicate {
                    write!(
                        f,
                        "received subsequent marker for snapshot {snapshot_id} from Process-{from}"
                    )
                } else {
                    write!(
                        f,
                        "received marker for snapshot {snapshot_id} from Process-{from}"
                    )
                }
            }
            Event::StateRecorded { snapshot_id, state } => write!(
                f,
                "recorded state for snapshot {snapshot_id}: held [{}], waiting {:?}",
                join_ids(&state.held.iter().copied().collect::<Vec<_>>()),
                state.waiting
            ),
            Event::SnapshotStarted {
                snapshot_id,
                initiator,
            } => write!(
                f,
                "--- starting global snapshot {snapshot_id} via Process-{initiator} ---"
            ),
            Event::GlobalStateCollected {
                snapshot_id,
                states,
                missing,
            } => {
                write!(
                    f,
                    "collected {} local state(s) for snapshot {snapshot_id}",
                    states.len()
                )?;
                if !missing.is_empty() {
                    write!(f, ", missing [{}]", join_ids(missing))?;
                }
                Ok(())
            }
            Event::WaitForGraphBuilt { snapshot_id, graph } => {
                if graph.is_empty() {
                    return write!(f, "wait-for graph for snapshot {snapshot_id}: (empty)");
                }
                write!(f, "wait-for graph for snapshot {snapshot_id}:")?;
                for (node, targets) in graph {
                    write!(f, " {node} -> [{}];", join_ids(targets))?;
                }
                Ok(())
            }
            Event::NoDeadlock { snapshot_id } => {
                write!(f, "--- no deadlock in snapshot {snapshot_id} ---")
            }
            Event::Deadlock { info } => write!(
                f,
                "!!! DEADLOCK DETECTED in snapshot {}: {} !!!",
                info.snapshot_id,
                info.process_cycle
                    .iter()
                    .map(|id| format!("Process-{id}"))
                    .collect::<Vec<_>>()
                    .join(" -> ")
            ),
        }
    }
}

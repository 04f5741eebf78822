//! # Lockcut
//!
//! A simulator of concurrent clients contending for exclusive resources, with
//! deadlock detection by consistent global snapshots.
//!
//! Every client process runs on its own thread and works through reads and
//! multi-resource writes. A detector periodically starts a marker-based
//! snapshot at one process, gathers the local states the processes recorded,
//! builds a wait-for graph and looks for a cycle. The first cycle ends the
//! whole simulation.
//!
//! ## Features
//!
//! - Marker snapshots that never pause the processes
//! - Deterministic wait-for cycle detection
//! - Structured JSON-lines event log
//! - Scripted or seeded random workloads

mod core;
pub use core::{
    Action, DeadlockInfo, Detector, DetectorConfig, DetectorReport, DurationRange, EventLogger,
    LockManager, Process, ProcessContext, ProcessHandle, RandomWorkload, Registry, Resource,
    ScriptedWorkload, Shutdown, Simulation, SimulationConfig, SimulationHandle, SimulationReport,
    SnapshotOutcome, SnapshotRecord, WaitForGraph, Workload, WorkloadFactory,
    logger::{Actor, Event, LogEntry, LogFormat, Severity},
    process::Message,
    types::{
        AcquireOutcome, DetectorState, GlobalState, LocalState, ProcessId, ProcessState,
        ReleaseOutcome, ResourceId, SnapshotId,
    },
};

pub const BANNER: &str = r#"
  ▖   ▄▖▄▖▖▖▄▖▖▖▄▖
  ▌   ▌▌▌ ▙▘▌ ▌▌▐
  ▙▖  ▙▌▙▖▌▌▙▖▙▌▐
"#;

use crate::core::detector::{Detector, SnapshotRecord};
use crate::core::graph::WaitForGraph;
use crate::core::logger::Event;
use crate::core::types::{DeadlockInfo, DetectorState, ProcessId};
use chrono::Utc;

/// Assemble the report for a cycle found in `record`
///
/// # Arguments
/// * `record` - The snapshot the cycle was found in
/// * `graph` - The wait-for graph built from `record`
/// * `cycle` - The closed cycle as returned by [`WaitForGraph::detect_cycle`]
pub fn extract_deadlock_info(
    record: &SnapshotRecord,
    graph: &WaitForGraph,
    cycle: Vec<ProcessId>,
) -> DeadlockInfo {
    let members = cycle.len().saturating_sub(1);
    let process_waiting_for_resources = cycle[..members]
        .iter()
        .filter_map(|&p| {
            record
                .states
                .get(&p)
                .and_then(|state| state.waiting)
                .map(|r| (p, r))
        })
        .collect();

    DeadlockInfo {
        snapshot_id: record.snapshot_id,
        process_cycle: cycle,
        process_waiting_for_resources,
        wait_for_graph: graph.edges().clone(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

impl Detector {
    /// Deadlock is terminal: report it, then bring the whole system down
    ///
    /// Processes are only told to stop; each releases what it holds on its
    /// own way out.
    pub(crate) fn handle_deadlock(&mut self, info: DeadlockInfo) {
        self.logger.log_detector(Event::Deadlock { info: info.clone() });

        if let Some(callback) = &self.callback {
            callback(info);
        }

        self.registry.stop_all();
        self.shutdown.trigger();
        self.state = DetectorState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LocalState;

    #[test]
    fn test_extract_only_lists_cycle_members() {
        let record = SnapshotRecord {
            snapshot_id: 3,
            states: [
                (0, LocalState::new([10], Some(20))),
                (1, LocalState::new([20], Some(30))),
                (2, LocalState::new([30], Some(20))),
            ]
            .into_iter()
            .collect(),
            missing: vec![],
        };
        let graph = WaitForGraph::from_global_state(&record.states);
        let cycle = graph.detect_cycle().unwrap();
        assert_eq!(cycle, vec![1, 2, 1]);

        let info = extract_deadlock_info(&record, &graph, cycle);
        assert_eq!(info.snapshot_id, 3);
        assert_eq!(info.processes(), &[1, 2]);
        assert_eq!(info.process_waiting_for_resources, vec![(1, 30), (2, 20)]);
        assert_eq!(info.wait_for_graph.get(&0), Some(&vec![1]));
        assert!(!info.timestamp.is_empty());
    }
}

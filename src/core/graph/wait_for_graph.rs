//! Wait-For Graph built from a global snapshot
//!
//! The graph is derived from one consistent cut and never changes afterwards.
//! An edge `A -> B` means process A was waiting on a resource that process B
//! held in that same cut.
//!
//! # How it works
//!
//! 1. Every held resource in the cut is mapped to its holder.
//! 2. Every process with a pending request whose resource has a known holder
//!    other than itself gets an edge to that holder.
//! 3. Cycle detection is a three-colour DFS. Roots and neighbours are visited
//!    in a fixed order so identical cuts always yield the identical cycle.

use crate::core::types::{GlobalState, ProcessId, ResourceId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Represents a directed graph of process wait relationships
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WaitForGraph {
    /// Maps a process to the processes it waits on, in discovery order
    edges: BTreeMap<ProcessId, Vec<ProcessId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

impl WaitForGraph {
    /// Build the graph for one snapshot
    ///
    /// If a cut ever shows two holders for the same resource, the process
    /// with the lowest id is taken as the holder.
    pub fn from_global_state(state: &GlobalState) -> Self {
        let mut holders: BTreeMap<ResourceId, ProcessId> = BTreeMap::new();
        for (&process_id, local) in state {
            for &resource_id in &local.held {
                holders.entry(resource_id).or_insert(process_id);
            }
        }

        let mut edges: BTreeMap<ProcessId, Vec<ProcessId>> = BTreeMap::new();
        for (&process_id, local) in state {
            let Some(waiting) = local.waiting else {
                continue;
            };
            if let Some(&holder) = holders.get(&waiting)
                && holder != process_id
            {
                let targets = edges.entry(process_id).or_default();
                if !targets.contains(&holder) {
                    targets.push(holder);
                }
            }
        }

        WaitForGraph { edges }
    }

    /// Number of processes with at least one outgoing edge
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The processes `process_id` waits on (empty if none)
    pub fn waits_on(&self, process_id: ProcessId) -> &[ProcessId] {
        self.edges
            .get(&process_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edges(&self) -> &BTreeMap<ProcessId, Vec<ProcessId>> {
        &self.edges
    }

    pub fn into_edges(self) -> BTreeMap<ProcessId, Vec<ProcessId>> {
        self.edges
    }

    /// Find a cycle in the graph
    ///
    /// # Returns
    /// * `Some(cycle)` - The processes on the cycle, closed: the first entry
    ///   is repeated at the end
    /// * `None` - The graph is acyclic
    pub fn detect_cycle(&self) -> Option<Vec<ProcessId>> {
        let mut marks: BTreeMap<ProcessId, Mark> = BTreeMap::new();
        let mut path = Vec::new();

        fn dfs(
            graph: &WaitForGraph,
            node: ProcessId,
            marks: &mut BTreeMap<ProcessId, Mark>,
            path: &mut Vec<ProcessId>,
        ) -> Option<Vec<ProcessId>> {
            marks.insert(node, Mark::Visiting);
            path.push(node);

            for &next in graph.waits_on(node) {
                match marks.get(&next) {
                    Some(Mark::Visiting) => {
                        // Back edge: the cycle runs from `next` to the end of the path
                        let start = path.iter().position(|&id| id == next)?;
                        let mut cycle = path[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Some(Mark::Visited) => {}
                    None => {
                        if let Some(cycle) = dfs(graph, next, marks, path) {
                            return Some(cycle);
                        }
                    }
                }
            }

            path.pop();
            marks.insert(node, Mark::Visited);
            None
        }

        for &root in self.edges.keys() {
            if marks.contains_key(&root) {
                continue;
            }
            if let Some(cycle) = dfs(self, root, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }
}

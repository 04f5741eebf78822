//! Graph module for deadlock detection
//!
//! The wait-for graph is built from a single global snapshot and searched for
//! cycles; a cycle is a deadlock.

pub mod wait_for_graph;

pub use wait_for_graph::WaitForGraph;

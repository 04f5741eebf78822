use crate::core::types::ResourceId;
use std::time::Duration;

/// A write that needs one or more resources at once
///
/// Resources are acquired strictly in the order given. The transaction keeps
/// track of what it has acquired so that abandoning it releases exactly
/// those resources, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    resources: Vec<ResourceId>,
    acquired: Vec<ResourceId>,
    duration: Duration,
}

impl Transaction {
    /// Duplicate resource ids are dropped, keeping the first occurrence
    pub fn new(resources: Vec<ResourceId>, duration: Duration) -> Self {
        let mut ordered = Vec::with_capacity(resources.len());
        for resource in resources {
            if !ordered.contains(&resource) {
                ordered.push(resource);
            }
        }
        Transaction {
            resources: ordered,
            acquired: Vec::new(),
            duration,
        }
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn acquired(&self) -> &[ResourceId] {
        &self.acquired
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The resource to request next, or `None` once everything is held
    pub fn next_resource(&self) -> Option<ResourceId> {
        self.resources.get(self.acquired.len()).copied()
    }

    pub fn record_acquired(&mut self, resource: ResourceId) {
        debug_assert_eq!(self.next_resource(), Some(resource));
        self.acquired.push(resource);
    }

    pub fn is_complete(&self) -> bool {
        self.acquired.len() == self.resources.len()
    }

    /// True right after the first of several resources was acquired
    pub fn in_deadlock_window(&self) -> bool {
        self.acquired.len() == 1 && self.resources.len() > 1
    }

    /// Acquired resources, newest first
    pub fn release_order(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.acquired.iter().rev().copied()
    }
}

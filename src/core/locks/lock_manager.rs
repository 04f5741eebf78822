use crate::core::locks::Resource;
use crate::core::logger::{Event, EventLogger};
use crate::core::shutdown::Shutdown;
use crate::core::types::{AcquireOutcome, ProcessId, ReleaseOutcome, ResourceId};
use std::sync::Arc;
use std::time::Duration;

/// Mediates every acquire and release on behalf of processes
///
/// The LockManager owns the resource registry, which is fixed at
/// construction. It is the only component that changes a resource's owner.
/// It does not know what a process holds; each process keeps its own held
/// set and updates it from the returned outcome.
pub struct LockManager {
    /// Indexed by resource id
    resources: Vec<Resource>,
    shutdown: Shutdown,
    logger: Arc<EventLogger>,
}

impl LockManager {
    /// Create `count` resources with ids `0..count`
    pub fn new(count: usize, shutdown: Shutdown, logger: Arc<EventLogger>) -> Self {
        LockManager {
            resources: (0..count).map(Resource::new).collect(),
            shutdown,
            logger,
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources.iter().map(Resource::id)
    }

    pub fn owner_of(&self, resource_id: ResourceId) -> Option<ProcessId> {
        self.resources.get(resource_id).and_then(Resource::owner)
    }

    /// Request exclusive ownership of a resource, waiting at most `timeout`
    ///
    /// A grant is re-checked against the shutdown signal before it is
    /// reported: if the system started shutting down while the caller was
    /// waiting, the lock is handed straight back and the request is reported
    /// as [`AcquireOutcome::Abandoned`].
    ///
    /// # Arguments
    /// * `process_id` - The requesting process
    /// * `resource_id` - The resource being requested
    /// * `timeout` - Upper bound on how long to wait
    pub fn acquire(
        &self,
        process_id: ProcessId,
        resource_id: ResourceId,
        timeout: Duration,
    ) -> AcquireOutcome {
        let Some(resource) = self.resources.get(resource_id) else {
            return AcquireOutcome::Unknown;
        };

        self.logger.log_process(
            process_id,
            Event::Attempt {
                resource: resource_id,
            },
        );

        if !resource.try_acquire_for(process_id, timeout) {
            self.logger.log_process(
                process_id,
                Event::TimedOut {
                    resource: resource_id,
                },
            );
            return AcquireOutcome::TimedOut;
        }

        if self.shutdown.is_triggered() {
            resource.release(process_id);
            self.logger.log_process(
                process_id,
                Event::Abandoned {
                    resource: resource_id,
                },
            );
            return AcquireOutcome::Abandoned;
        }

        self.logger.log_process(
            process_id,
            Event::Acquired {
                resource: resource_id,
            },
        );
        AcquireOutcome::Granted
    }

    /// Give up ownership of a resource
    ///
    /// Releasing something the caller does not own, or that does not exist,
    /// changes nothing and is logged as a warning.
    pub fn release(&self, process_id: ProcessId, resource_id: ResourceId) -> ReleaseOutcome {
        let outcome = match self.resources.get(resource_id) {
            None => ReleaseOutcome::Unknown,
            Some(resource) if resource.release(process_id) => ReleaseOutcome::Released,
            Some(_) => ReleaseOutcome::NotOwner,
        };

        let event = match outcome {
            ReleaseOutcome::Released => Event::Released {
                resource: resource_id,
            },
            rejected => Event::ReleaseRejected {
                resource: resource_id,
                outcome: rejected,
            },
        };
        self.logger.log_process(process_id, event);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_millis(20);

    fn manager(count: usize) -> (LockManager, Shutdown) {
        let shutdown = Shutdown::new();
        let manager = LockManager::new(count, shutdown.clone(), Arc::new(EventLogger::disabled()));
        (manager, shutdown)
    }

    #[test]
    fn test_acquire_sets_owner() {
        let (manager, _) = manager(2);
        assert_eq!(manager.acquire(1, 0, TIMEOUT), AcquireOutcome::Granted);
        assert_eq!(manager.owner_of(0), Some(1));
        assert_eq!(manager.owner_of(1), None);
    }

    #[test]
    fn test_contended_acquire_times_out_without_side_effects() {
        let (manager, _) = manager(1);
        assert_eq!(manager.acquire(1, 0, TIMEOUT), AcquireOutcome::Granted);
        assert_eq!(manager.acquire(2, 0, TIMEOUT), AcquireOutcome::TimedOut);
        assert_eq!(manager.owner_of(0), Some(1));
    }

    #[test]
    fn test_unknown_resource() {
        let (manager, _) = manager(1);
        assert_eq!(manager.acquire(1, 5, TIMEOUT), AcquireOutcome::Unknown);
        assert_eq!(manager.release(1, 5), ReleaseOutcome::Unknown);
    }

    #[test]
    fn test_release_by_non_owner_is_a_no_op() {
        let (manager, _) = manager(1);
        assert_eq!(manager.release(1, 0), ReleaseOutcome::NotOwner);
        assert_eq!(manager.owner_of(0), None);

        assert_eq!(manager.acquire(1, 0, TIMEOUT), AcquireOutcome::Granted);
        assert_eq!(manager.release(2, 0), ReleaseOutcome::NotOwner);
        assert_eq!(manager.owner_of(0), Some(1));
        assert_eq!(manager.release(1, 0), ReleaseOutcome::Released);
        assert_eq!(manager.owner_of(0), None);
    }

    #[test]
    fn test_grant_during_shutdown_is_abandoned() {
        let (manager, shutdown) = manager(1);
        shutdown.trigger();
        assert_eq!(manager.acquire(1, 0, TIMEOUT), AcquireOutcome::Abandoned);
        assert_eq!(manager.owner_of(0), None);
    }

    #[test]
    fn test_shutdown_while_blocked_abandons_the_grant() {
        let (manager, shutdown) = manager(1);
        let manager = Arc::new(manager);
        assert_eq!(manager.acquire(1, 0, TIMEOUT), AcquireOutcome::Granted);

        let waiter = Arc::clone(&manager);
        let handle = thread::spawn(move || waiter.acquire(0, 0, Duration::from_secs(2)));

        thread::sleep(Duration::from_millis(50));
        shutdown.trigger();
        assert_eq!(manager.release(1, 0), ReleaseOutcome::Released);

        assert_eq!(handle.join().unwrap(), AcquireOutcome::Abandoned);
        assert_eq!(manager.owner_of(0), None);
    }

    #[test]
    fn test_resource_ids_are_dense() {
        let (manager, _) = manager(3);
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.resource_ids().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}

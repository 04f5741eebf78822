use crate::core::shutdown::deadline_after;
use crate::core::types::{ProcessId, ResourceId};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// An exclusively lockable resource (a "table")
///
/// The owner slot is the lock itself: a resource is locked exactly when it
/// has an owner, so there can never be more than one. Waiters park on a
/// condvar and are woken one at a time on release.
pub struct Resource {
    id: ResourceId,
    owner: Mutex<Option<ProcessId>>,
    released: Condvar,
}

impl Resource {
    pub fn new(id: ResourceId) -> Self {
        Resource {
            id,
            owner: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Current owner, if any
    pub fn owner(&self) -> Option<ProcessId> {
        *self.owner.lock()
    }

    /// Wait up to `timeout` for the resource to become free and take it
    ///
    /// # Returns
    /// `true` if `process_id` is now the owner
    pub fn try_acquire_for(&self, process_id: ProcessId, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let mut owner = self.owner.lock();
        while owner.is_some() {
            if self.released.wait_until(&mut owner, deadline).timed_out() {
                break;
            }
        }
        if owner.is_some() {
            return false;
        }
        *owner = Some(process_id);
        true
    }

    /// Give the resource up if `process_id` owns it
    ///
    /// # Returns
    /// `false` (and no change) if `process_id` is not the owner
    pub fn release(&self, process_id: ProcessId) -> bool {
        let mut owner = self.owner.lock();
        if *owner != Some(process_id) {
            return false;
        }
        *owner = None;
        self.released.notify_one();
        true
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("owner", &self.owner())
            .finish()
    }
}

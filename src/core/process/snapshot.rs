//! Marker handling for global snapshots
//!
//! A process records its own local state the first time it learns about a
//! snapshot, either because the detector asked it to initiate one or because
//! a peer's marker arrived, and only then passes markers on. Recording before
//! forwarding is what makes the collected states a consistent cut. Channels
//! are assumed empty, so a repeated marker carries no information beyond
//! being logged.

use crate::core::logger::Event;
use crate::core::process::Process;
use crate::core::process::handle::Message;
use crate::core::types::{LocalState, ProcessId, SnapshotId};
use fxhash::{FxHashMap, FxHashSet};

/// Per-process snapshot bookkeeping, guarded by the process's snapshot lock
#[derive(Debug, Default)]
pub struct SnapshotBook {
    /// Snapshots this process has already recorded, above `discarded_through`
    received: FxHashSet<SnapshotId>,
    local_states: FxHashMap<SnapshotId, LocalState>,
    /// Every snapshot up to this id is finished and forgotten
    discarded_through: SnapshotId,
}

impl SnapshotBook {
    pub fn has_received(&self, snapshot_id: SnapshotId) -> bool {
        snapshot_id <= self.discarded_through || self.received.contains(&snapshot_id)
    }

    /// Store `state` for `snapshot_id` unless something is already recorded
    ///
    /// # Returns
    /// `true` if this call recorded the state
    pub fn record(&mut self, snapshot_id: SnapshotId, state: LocalState) -> bool {
        if snapshot_id <= self.discarded_through || !self.received.insert(snapshot_id) {
            return false;
        }
        self.local_states.insert(snapshot_id, state);
        true
    }

    pub fn local_state(&self, snapshot_id: SnapshotId) -> Option<&LocalState> {
        self.local_states.get(&snapshot_id)
    }

    /// Forget `snapshot_id` and every older snapshot
    ///
    /// Ids only grow, so a single watermark is enough to keep late markers
    /// for finished snapshots recognised as duplicates.
    pub fn discard(&mut self, snapshot_id: SnapshotId) {
        self.discarded_through = self.discarded_through.max(snapshot_id);
        let through = self.discarded_through;
        self.received.retain(|&id| id > through);
        self.local_states.retain(|&id, _| id > through);
    }

    pub fn recorded(&self) -> usize {
        self.local_states.len()
    }

    /// Snapshot ids tracked individually
    pub fn tracked(&self) -> usize {
        self.received.len()
    }
}

impl Process {
    /// Handle every queued protocol message without blocking
    pub(crate) fn process_mailbox(&mut self) {
        while let Ok(message) = self.mailbox.try_recv() {
            self.handle_message(message);
        }
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Initiate { snapshot_id } => self.initiate_snapshot(snapshot_id),
            Message::Marker { from, snapshot_id } => self.receive_marker(from, snapshot_id),
        }
    }

    /// Start `snapshot_id` here: record, then send a marker to every peer
    pub fn initiate_snapshot(&mut self, snapshot_id: SnapshotId) {
        if !self.record_if_first(snapshot_id) {
            return;
        }
        self.logger
            .log_process(self.id, Event::SnapshotInitiated { snapshot_id });
        self.send_markers(snapshot_id, None);
    }

    /// React to a marker from `from`
    ///
    /// The first marker for a snapshot records local state and forwards the
    /// marker to every peer except the sender. Later ones are only logged.
    pub fn receive_marker(&mut self, from: ProcessId, snapshot_id: SnapshotId) {
        let first = self.record_if_first(snapshot_id);
        self.logger.log_process(
            self.id,
            Event::MarkerReceived {
                snapshot_id,
                from,
                duplicate: !first,
            },
        );
        if first {
            self.send_markers(snapshot_id, Some(from));
        }
    }

    fn record_if_first(&self, snapshot_id: SnapshotId) -> bool {
        let state = self.local_state();
        let recorded = self.book.lock().record(snapshot_id, state.clone());
        if recorded {
            self.logger
                .log_process(self.id, Event::StateRecorded { snapshot_id, state });
        }
        recorded
    }

    fn send_markers(&self, snapshot_id: SnapshotId, except: Option<ProcessId>) {
        for peer in self.registry.iter() {
            if peer.id() == self.id || Some(peer.id()) == except {
                continue;
            }
            peer.receive_marker(self.id, snapshot_id);
            self.logger.log_process(
                self.id,
                Event::MarkerSent {
                    snapshot_id,
                    to: peer.id(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::tests::Harness;
    use crate::core::workload::{Action, ScriptedWorkload};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_book_records_once() {
        let mut book = SnapshotBook::default();
        assert!(book.record(1, LocalState::new([1], None)));
        assert!(!book.record(1, LocalState::new([2], Some(3))));
        assert_eq!(book.local_state(1), Some(&LocalState::new([1], None)));
        assert_eq!(book.recorded(), 1);
    }

    #[test]
    fn test_discard_keeps_duplicate_detection() {
        let mut book = SnapshotBook::default();
        book.record(1, LocalState::idle());
        book.discard(1);
        assert_eq!(book.local_state(1), None);
        assert!(book.has_received(1));
        assert!(!book.record(1, LocalState::idle()));
    }

    #[test]
    fn test_discard_prunes_older_snapshots() {
        let mut book = SnapshotBook::default();
        for id in 1..=50 {
            book.record(id, LocalState::idle());
            book.discard(id);
        }
        assert_eq!(book.tracked(), 0);
        assert_eq!(book.recorded(), 0);

        // Late markers for finished snapshots stay duplicates
        assert!(book.has_received(17));
        assert!(!book.record(17, LocalState::idle()));

        // An unfinished newer snapshot survives discarding an older one
        assert!(book.record(52, LocalState::new([1], None)));
        book.discard(51);
        assert_eq!(book.local_state(52), Some(&LocalState::new([1], None)));
        assert!(book.record(53, LocalState::idle()));
        assert_eq!(book.tracked(), 2);
    }

    #[test]
    fn test_repeated_marker_records_once_and_forwards_once() {
        let h = Harness::new(3, 2);
        let mut process = h.process(0);

        process.receive_marker(1, 5);
        process.held.insert(1);
        process.receive_marker(2, 5);

        assert_eq!(
            h.handles[0].collect_local_state(5),
            Some(LocalState::idle())
        );

        // Forwarded to process 2 only: process 1 sent the marker
        assert!(h.inboxes[1].try_recv().is_err());
        assert_eq!(
            h.inboxes[2].try_recv().unwrap(),
            Message::Marker {
                from: 0,
                snapshot_id: 5
            }
        );
        assert!(h.inboxes[2].try_recv().is_err());
    }

    #[test]
    fn test_initiate_records_then_marks_every_peer() {
        let h = Harness::new(3, 2);
        let mut process = h.process(1);
        process.held.insert(0);
        process.waiting_for = Some(1);

        process.initiate_snapshot(1);
        process.initiate_snapshot(1);

        assert_eq!(
            h.handles[1].collect_local_state(1),
            Some(LocalState::new([0], Some(1)))
        );
        for peer in [0, 2] {
            assert_eq!(
                h.inboxes[peer].try_recv().unwrap(),
                Message::Marker {
                    from: 1,
                    snapshot_id: 1
                }
            );
            assert!(h.inboxes[peer].try_recv().is_err());
        }
    }

    #[test]
    fn test_state_is_recorded_before_the_turn_acts() {
        let h = Harness::new(2, 2);
        let mut process = h.process_with(
            0,
            ScriptedWorkload::new([Action::Write {
                resources: vec![0, 1],
                duration: Duration::ZERO,
            }])
            .with_deadlock_window(Duration::ZERO),
        );

        h.handles[0].receive_marker(1, 1);
        assert!(process.turn());

        // The marker was queued before the write started, so the cut sees
        // the process empty-handed even though it now holds resource 0
        assert_eq!(h.handles[0].collect_local_state(1), Some(LocalState::idle()));
        assert!(process.held().contains(&0));
        assert_eq!(h.context.lock_manager.owner_of(0), Some(0));
    }

    #[test]
    fn test_marker_is_answered_during_a_long_read() {
        let h = Harness::new(2, 1);
        let process = h.process_with(
            0,
            ScriptedWorkload::new([Action::Read {
                resource: 0,
                duration: Duration::from_secs(5),
            }]),
        );
        let runner = thread::spawn(move || process.run());

        thread::sleep(Duration::from_millis(50));
        h.handles[0].receive_marker(1, 7);
        thread::sleep(Duration::from_millis(100));

        // Recorded while the read is still running
        assert_eq!(h.handles[0].collect_local_state(7), Some(LocalState::idle()));
        assert!(h.handles[0].is_running());

        h.context.shutdown.trigger();
        runner.join().unwrap();
        assert!(!h.handles[0].is_running());
    }

    #[test]
    fn test_mailbox_is_drained_in_order() {
        let h = Harness::new(2, 1);
        let mut process = h.process(0);

        h.handles[0].initiate_snapshot(1);
        h.handles[0].receive_marker(1, 2);
        h.handles[0].receive_marker(1, 1);
        process.process_mailbox();

        assert!(h.handles[0].collect_local_state(1).is_some());
        assert!(h.handles[0].collect_local_state(2).is_some());
        // Snapshot 1 reached process 1 once, snapshot 2 came from process 1 itself
        assert_eq!(
            h.inboxes[1].try_recv().unwrap(),
            Message::Marker {
                from: 0,
                snapshot_id: 1
            }
        );
        assert!(h.inboxes[1].try_recv().is_err());
    }
}

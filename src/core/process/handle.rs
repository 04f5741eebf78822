use crate::core::process::snapshot::SnapshotBook;
use crate::core::types::{LocalState, ProcessId, SnapshotId};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Protocol messages delivered through a process's mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Start snapshot `snapshot_id` at this process
    Initiate { snapshot_id: SnapshotId },
    /// Marker for `snapshot_id` sent by process `from`
    Marker {
        from: ProcessId,
        snapshot_id: SnapshotId,
    },
}

/// The shareable side of a process
///
/// Peers and the detector talk to a process only through its handle: they
/// enqueue protocol messages and read recorded snapshot states. Nothing
/// here touches the process's live held/waiting fields.
#[derive(Clone)]
pub struct ProcessHandle {
    id: ProcessId,
    mailbox: Sender<Message>,
    book: Arc<Mutex<SnapshotBook>>,
    running: Arc<AtomicBool>,
}

impl ProcessHandle {
    /// Create a handle and the receiving end of its mailbox
    pub fn new(id: ProcessId) -> (Self, Receiver<Message>) {
        let (tx, rx) = unbounded();
        let handle = ProcessHandle {
            id,
            mailbox: tx,
            book: Arc::new(Mutex::new(SnapshotBook::default())),
            running: Arc::new(AtomicBool::new(true)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Ask this process to start snapshot `snapshot_id`
    pub fn initiate_snapshot(&self, snapshot_id: SnapshotId) {
        self.send(Message::Initiate { snapshot_id });
    }

    /// Deliver a marker from process `from`
    pub fn receive_marker(&self, from: ProcessId, snapshot_id: SnapshotId) {
        self.send(Message::Marker { from, snapshot_id });
    }

    // A process that has already exited has dropped its receiver; there is
    // nobody left to record anything, so the message is simply lost.
    fn send(&self, message: Message) {
        let _ = self.mailbox.send(message);
    }

    /// The state this process recorded for `snapshot_id`, if it has done so
    ///
    /// Takes only this process's snapshot lock.
    pub fn collect_local_state(&self, snapshot_id: SnapshotId) -> Option<LocalState> {
        self.book.lock().local_state(snapshot_id).cloned()
    }

    /// Drop the recorded state of a finished snapshot
    pub fn discard_snapshot(&self, snapshot_id: SnapshotId) {
        self.book.lock().discard(snapshot_id);
    }

    /// Ask the process to stop at the start of its next turn
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn book(&self) -> Arc<Mutex<SnapshotBook>> {
        Arc::clone(&self.book)
    }

    pub(crate) fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Every process of a run, addressable by id
///
/// Built once before any process starts and never modified afterwards.
#[derive(Debug)]
pub struct Registry {
    /// Sorted by process id
    handles: Vec<ProcessHandle>,
}

impl Registry {
    pub fn new(mut handles: Vec<ProcessHandle>) -> Self {
        handles.sort_by_key(ProcessHandle::id);
        handles.dedup_by_key(|h| h.id());
        Registry { handles }
    }

    pub fn get(&self, id: ProcessId) -> Option<&ProcessHandle> {
        self.handles
            .binary_search_by_key(&id, ProcessHandle::id)
            .ok()
            .map(|index| &self.handles[index])
    }

    /// Handles in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &ProcessHandle> {
        self.handles.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.handles.iter().map(ProcessHandle::id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Ask every process to stop
    pub fn stop_all(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }
}

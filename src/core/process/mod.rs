//! Simulated client processes
//!
//! Each process is an active object: a [`Process`] value owned by its own
//! thread and driven by [`Process::run`], plus a cloneable [`ProcessHandle`]
//! through which everybody else reaches it.
//!
//! # Scheduling turn
//!
//! 1. Handle queued snapshot messages, before anything else
//! 2. Stop if the process was asked to, or the system is shutting down
//! 3. If a write is outstanding, retry its next lock (bounded wait)
//! 4. Otherwise ask the workload for a new action
//!
//! Every pause inside a turn (a read, the deadlock window, a write's hold,
//! the cooldown) keeps answering snapshot messages, so the only time a
//! process is deaf to markers is while it blocks in a bounded acquire.
//!
//! A write is a persistent goal. A timed-out request leaves `waiting_for`
//! set and is retried on the next turn, never dropped or swapped for another
//! resource, which keeps wait-for edges stable long enough for a snapshot to
//! see them.

pub mod handle;
pub mod snapshot;
pub mod transaction;

pub use handle::{Message, ProcessHandle, Registry};
pub use snapshot::SnapshotBook;
pub use transaction::Transaction;

use crate::core::locks::LockManager;
use crate::core::logger::{Event, EventLogger};
use crate::core::shutdown::{Shutdown, deadline_after};
use crate::core::types::{AcquireOutcome, LocalState, ProcessId, ProcessState, ResourceId};
use crate::core::workload::{Action, Workload};
use crossbeam_channel::{Receiver, select};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// What every process of a run shares
#[derive(Clone)]
pub struct ProcessContext {
    pub registry: Arc<Registry>,
    pub lock_manager: Arc<LockManager>,
    pub shutdown: Shutdown,
    pub logger: Arc<EventLogger>,
    pub acquire_timeout: Duration,
}

/// A client that reads and writes shared resources
pub struct Process {
    id: ProcessId,
    mailbox: Receiver<Message>,
    book: Arc<Mutex<SnapshotBook>>,
    running: Arc<AtomicBool>,
    registry: Arc<Registry>,
    lock_manager: Arc<LockManager>,
    shutdown: Shutdown,
    logger: Arc<EventLogger>,
    acquire_timeout: Duration,
    workload: Box<dyn Workload>,
    /// Resources this process owns right now
    held: BTreeSet<ResourceId>,
    /// Outstanding, unsatisfied lock request
    waiting_for: Option<ResourceId>,
    /// The current write, kept until it completes or is abandoned
    transaction: Option<Transaction>,
    state: ProcessState,
}

impl Process {
    /// Create the process behind `handle`
    ///
    /// # Arguments
    /// * `handle` - The handle registered for this process
    /// * `mailbox` - The receiving end created together with `handle`
    /// * `context` - Shared registry, lock manager, shutdown signal and logger
    /// * `workload` - Source of this process's actions
    pub fn new(
        handle: &ProcessHandle,
        mailbox: Receiver<Message>,
        context: ProcessContext,
        workload: Box<dyn Workload>,
    ) -> Self {
        Process {
            id: handle.id(),
            mailbox,
            book: handle.book(),
            running: handle.running_flag(),
            registry: context.registry,
            lock_manager: context.lock_manager,
            shutdown: context.shutdown,
            logger: context.logger,
            acquire_timeout: context.acquire_timeout,
            workload,
            held: BTreeSet::new(),
            waiting_for: None,
            transaction: None,
            state: ProcessState::Idle,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn held(&self) -> &BTreeSet<ResourceId> {
        &self.held
    }

    pub fn waiting_for(&self) -> Option<ResourceId> {
        self.waiting_for
    }

    /// Current held/waiting state, as a snapshot would record it
    pub fn local_state(&self) -> LocalState {
        LocalState {
            held: self.held.clone(),
            waiting: self.waiting_for,
        }
    }

    fn should_run(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.shutdown.is_triggered()
    }

    /// Run turns until stopped, then release whatever is still held
    pub fn run(mut self) {
        self.logger.log_process(self.id, Event::ProcessStarted);
        while self.turn() {}
        self.exit();
    }

    /// One scheduling turn
    ///
    /// # Returns
    /// `false` once the process should stop
    pub fn turn(&mut self) -> bool {
        self.process_mailbox();
        if !self.should_run() {
            return false;
        }

        if self.transaction.is_some() {
            self.advance_transaction();
        } else {
            self.choose_action();
        }

        self.should_run()
    }

    fn choose_action(&mut self) {
        self.state = ProcessState::ChoosingAction;
        match self.workload.next_action() {
            None => {
                self.state = ProcessState::Idle;
                self.cool_down();
            }
            Some(Action::Read { resource, duration }) => {
                self.state = ProcessState::Reading;
                self.logger.log_process(
                    self.id,
                    Event::Read {
                        resource,
                        duration_ms: duration.as_millis() as u64,
                    },
                );
                self.pause(duration);
                self.state = ProcessState::Idle;
                self.cool_down();
            }
            Some(Action::Write {
                resources,
                duration,
            }) => {
                let transaction = Transaction::new(resources, duration);
                if transaction.resources().is_empty() {
                    self.state = ProcessState::Idle;
                    return;
                }
                self.logger.log_process(
                    self.id,
                    Event::GoalSet {
                        resources: transaction.resources().to_vec(),
                    },
                );
                self.transaction = Some(transaction);
                self.advance_transaction();
            }
        }
    }

    /// Request the next resource of the current write
    fn advance_transaction(&mut self) {
        let Some(resource) = self.transaction.as_ref().and_then(Transaction::next_resource) else {
            return;
        };

        self.state = ProcessState::Acquiring;
        self.waiting_for = Some(resource);

        match self
            .lock_manager
            .acquire(self.id, resource, self.acquire_timeout)
        {
            AcquireOutcome::Granted => {
                self.waiting_for = None;
                self.held.insert(resource);
                let Some(transaction) = self.transaction.as_mut() else {
                    return;
                };
                transaction.record_acquired(resource);

                if transaction.is_complete() {
                    self.perform_write();
                } else if transaction.in_deadlock_window() {
                    let window = self.workload.deadlock_window();
                    self.pause(window);
                }
            }
            AcquireOutcome::TimedOut => {
                // Keep the goal; the next turn asks again
                self.state = ProcessState::Waiting;
            }
            AcquireOutcome::Abandoned | AcquireOutcome::Unknown => {
                self.waiting_for = None;
                self.release_transaction();
            }
        }
    }

    /// Hold every resource of the write for its duration, then let go
    fn perform_write(&mut self) {
        self.state = ProcessState::Holding;
        let duration = self
            .transaction
            .as_ref()
            .map(Transaction::duration)
            .unwrap_or_default();
        let interrupted = self.pause(duration);
        self.release_transaction();
        if !interrupted {
            self.cool_down();
        }
    }

    /// Release everything the current write acquired, newest first
    fn release_transaction(&mut self) {
        let Some(transaction) = self.transaction.take() else {
            return;
        };
        self.state = ProcessState::Releasing;
        for resource in transaction.release_order() {
            self.lock_manager.release(self.id, resource);
            self.held.remove(&resource);
        }
        self.waiting_for = None;
        self.state = ProcessState::Idle;
    }

    /// Let `duration` pass, answering snapshot messages as they arrive
    ///
    /// A marker that reaches a process in the middle of a read, a hold or a
    /// cooldown is recorded straight away against the current held/waiting
    /// state, so no pause delays a snapshot.
    ///
    /// # Returns
    /// `true` if shutdown cut the pause short
    fn pause(&mut self, duration: Duration) -> bool {
        let deadline = deadline_after(duration);
        let mailbox = self.mailbox.clone();
        let signal = self.shutdown.signal().clone();

        loop {
            if self.shutdown.is_triggered() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            select! {
                recv(mailbox) -> message => match message {
                    Ok(message) => self.handle_message(message),
                    // Every handle is gone, so no marker can arrive any more
                    Err(_) => return self.shutdown.sleep(remaining),
                },
                recv(signal) -> _ => return true,
                default(remaining) => return self.shutdown.is_triggered(),
            }
        }
    }

    fn cool_down(&mut self) {
        let cooldown = self.workload.cooldown();
        self.pause(cooldown);
    }

    /// Leave the run loop: abandon any in-flight write
    pub fn exit(&mut self) {
        self.release_transaction();
        self.running.store(false, Ordering::SeqCst);
        self.state = ProcessState::Stopped;
        self.logger.log_process(self.id, Event::ProcessStopped);
    }
}

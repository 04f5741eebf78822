//! Global shutdown signal shared by every process and the detector

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Stand-in for "never" when a duration does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// The instant `duration` from now, saturating far in the future
pub(crate) fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

struct Inner {
    flag: AtomicBool,
    /// Dropped on trigger, which disconnects `signal`
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// A cloneable, one-way shutdown flag
///
/// Polling goes through an atomic load. Waiting goes through a channel that
/// never carries a message and is disconnected when the signal is raised, so
/// it can be combined with other channels in a `select!`.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Shutdown {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    /// Raise the signal and wake every sleeper
    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.trigger.lock().take();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// A receiver that becomes ready (disconnected) once shutdown is raised
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Sleep for `duration` or until the signal is raised
    ///
    /// # Returns
    /// `true` if the sleep was cut short (or never started) by shutdown
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        match self.inner.signal.recv_deadline(deadline_after(duration)) {
            Err(RecvTimeoutError::Timeout) => self.is_triggered(),
            _ => true,
        }
    }
}

// Core types
pub mod types;
pub use types::*;

// Run parameters
pub mod config;
pub use config::{DurationRange, SimulationConfig};

// Logging functionality
pub mod logger;
pub use logger::EventLogger;

// Shutdown signal
pub mod shutdown;
pub use shutdown::Shutdown;

// Resources and the lock manager
pub mod locks;
pub use locks::{LockManager, Resource};

// Graph implementation
pub mod graph;
pub use graph::WaitForGraph;

// Client processes and the snapshot protocol
pub mod process;
pub use process::{Process, ProcessContext, ProcessHandle, Registry};

// Action sources
pub mod workload;
pub use workload::{Action, RandomWorkload, ScriptedWorkload, Workload, WorkloadFactory};

// Deadlock detector
pub mod detector;
pub use detector::{Detector, DetectorConfig, DetectorReport, SnapshotOutcome, SnapshotRecord};

use anyhow::{Context, Result};
use logger::{Actor, Event};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

enum LogTarget {
    Disabled,
    File(PathBuf),
    Console,
}

/// Lockcut simulation builder
pub struct Simulation {
    config: SimulationConfig,
    log: LogTarget,
    callback: Option<Box<dyn Fn(DeadlockInfo) + Send + 'static>>,
    workload: Option<WorkloadFactory>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Simulation {
    /// Create a new simulation with the given parameters
    ///
    /// By default:
    /// - Logging is disabled
    /// - No callback is registered; the deadlock is still reported by
    ///   [`SimulationHandle::join`]
    /// - Every process runs a [`RandomWorkload`] built from `config`
    pub fn new(config: SimulationConfig) -> Self {
        Simulation {
            config,
            log: LogTarget::Disabled,
            callback: None,
            workload: None,
        }
    }

    /// Activate logging to a JSON-lines file
    ///
    /// # Arguments
    /// * `path` - Path to the log file. If the path contains "{timestamp}",
    ///   it will be replaced with the current timestamp.
    pub fn with_log<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.log = LogTarget::File(path.as_ref().to_path_buf());
        self
    }

    /// Activate human-readable logging on stderr
    pub fn with_console_log(mut self) -> Self {
        self.log = LogTarget::Console;
        self
    }

    /// Set a callback to be invoked when a deadlock is detected
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(DeadlockInfo) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Replace the random workload, e.g. with scripted actions
    pub fn workload(mut self, factory: WorkloadFactory) -> Self {
        self.workload = Some(factory);
        self
    }

    /// Build every component and start all threads
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the log file cannot
    /// be opened, or a thread cannot be spawned.
    pub fn start(self) -> Result<SimulationHandle> {
        let config = self.config;
        config.validate().context("Invalid simulation config")?;

        let logger = Arc::new(match self.log {
            LogTarget::Disabled => EventLogger::disabled(),
            LogTarget::File(path) => {
                EventLogger::with_file(path).context("Failed to initialize logger")?
            }
            LogTarget::Console => EventLogger::console(),
        });
        logger.log(
            Actor::Simulation,
            Event::SimulationStarted {
                processes: config.num_processes,
                resources: config.num_resources,
            },
        );

        let shutdown = Shutdown::new();
        let (handles, mailboxes): (Vec<_>, Vec<_>) =
            (0..config.num_processes).map(ProcessHandle::new).unzip();
        let registry = Arc::new(Registry::new(handles.clone()));
        let lock_manager = Arc::new(LockManager::new(
            config.num_resources,
            shutdown.clone(),
            Arc::clone(&logger),
        ));
        let context = ProcessContext {
            registry: Arc::clone(&registry),
            lock_manager: Arc::clone(&lock_manager),
            shutdown: shutdown.clone(),
            logger: Arc::clone(&logger),
            acquire_timeout: config.acquire_timeout(),
        };
        let workload = self
            .workload
            .unwrap_or_else(|| RandomWorkload::factory(&config));

        let mut detector = Detector::new(
            Arc::clone(&registry),
            shutdown.clone(),
            Arc::clone(&logger),
            DetectorConfig {
                snapshot_period: config.snapshot_period(),
                propagation_window: config.propagation_window(),
                initiator: config.initiator(),
                max_snapshots: config.max_snapshots,
            },
        );
        if let Some(callback) = self.callback {
            detector.set_deadlock_callback(callback);
        }

        let mut process_threads = Vec::with_capacity(handles.len());
        for (handle, mailbox) in handles.iter().zip(mailboxes) {
            let process = Process::new(handle, mailbox, context.clone(), workload(handle.id()));
            let spawned = thread::Builder::new()
                .name(format!("Process-{}", handle.id()))
                .spawn(move || process.run());
            match spawned {
                Ok(thread) => process_threads.push(thread),
                Err(e) => {
                    shutdown.trigger();
                    return Err(e).context("Failed to spawn process thread");
                }
            }
        }

        let detector_thread = match thread::Builder::new()
            .name("Detector".into())
            .spawn(move || detector.run())
        {
            Ok(thread) => thread,
            Err(e) => {
                shutdown.trigger();
                return Err(e).context("Failed to spawn detector thread");
            }
        };

        Ok(SimulationHandle {
            process_threads,
            detector_thread,
            registry,
            lock_manager,
            shutdown,
            logger,
        })
    }

    /// Start the simulation and block until it ends
    pub fn run(self) -> Result<SimulationReport> {
        self.start()?.join()
    }
}

/// A running simulation
pub struct SimulationHandle {
    process_threads: Vec<JoinHandle<()>>,
    detector_thread: JoinHandle<DetectorReport>,
    registry: Arc<Registry>,
    lock_manager: Arc<LockManager>,
    shutdown: Shutdown,
    logger: Arc<EventLogger>,
}

/// How a simulation ended
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Snapshots started by the detector
    pub snapshots: u64,
    /// The deadlock that ended the run, if any
    pub deadlock: Option<DeadlockInfo>,
    /// The event log, if one was written to a file
    pub log_path: Option<PathBuf>,
}

impl SimulationHandle {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Ask every thread to wind down without waiting for a deadlock
    pub fn shutdown(&self) {
        self.registry.stop_all();
        self.shutdown.trigger();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Wait for the detector and every process to finish
    ///
    /// # Errors
    /// Returns an error if any thread panicked or the log cannot be flushed.
    pub fn join(self) -> Result<SimulationReport> {
        let detector = self
            .detector_thread
            .join()
            .map_err(|_| anyhow::anyhow!("Detector thread panicked"));

        // Processes must be joined even if the detector died, or they would
        // keep running on their own
        if detector.is_err() {
            self.shutdown.trigger();
        }
        let mut panicked = Vec::new();
        for (id, thread) in self.registry.ids().zip(self.process_threads) {
            if thread.join().is_err() {
                panicked.push(id);
            }
        }

        let detector = detector?;
        if !panicked.is_empty() {
            anyhow::bail!("Process thread(s) {panicked:?} panicked");
        }

        self.logger.log(
            Actor::Simulation,
            Event::SimulationFinished {
                deadlocked: detector.deadlock.is_some(),
                snapshots: detector.snapshots,
            },
        );
        self.logger.flush().context("Failed to flush event log")?;

        Ok(SimulationReport {
            snapshots: detector.snapshots,
            deadlock: detector.deadlock,
            log_path: self.logger.path().map(Path::to_path_buf),
        })
    }
}

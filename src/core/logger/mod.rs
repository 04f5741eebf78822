//! Logging functionality for Lockcut
//!
//! This module records every lock, marker and detector event of a run as a
//! stream of structured entries, either as JSON lines in a file (for later
//! analysis or visualization) or as human-readable lines on stderr.

mod event_logger;
mod events;

pub use event_logger::{EventLogger, LogEntry, LogFormat};
pub use events::{Actor, Event, Severity};

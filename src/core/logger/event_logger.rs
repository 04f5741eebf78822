//! Event logger for recording process, marker and detector operations
//!
//! Entries are handed to a background writer thread over a channel so that
//! logging never blocks a process on file I/O. The writer serializes each
//! entry either as a JSON line or as a human-readable line.

use super::events::{Actor, Event, Severity};
use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Structure for a single log entry
#[derive(Debug, Serialize, Clone)]
pub struct LogEntry {
    /// Absolute timestamp of when the event occurred (seconds since Unix Epoch)
    pub timestamp: f64,
    pub severity: Severity,
    pub actor: Actor,
    #[serde(flatten)]
    pub event: Event,
}

impl LogEntry {
    fn text_line(&self) -> String {
        let secs = self.timestamp.trunc() as i64;
        let nanos = ((self.timestamp.fract()) * 1_000_000_000.0) as u32;
        let clock = chrono::DateTime::from_timestamp(secs, nanos)
            .map(|t| t.format("%H:%M:%S%.3f").to_string())
            .unwrap_or_default();
        format!(
            "{clock} {:<5} {:<12} {}",
            self.severity, self.actor.to_string(), self.event
        )
    }
}

/// How the writer thread renders entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// `HH:MM:SS.mmm LEVEL actor message`
    Text,
}

/// Commands for controlling the async logger thread
enum LoggerCommand {
    /// Write a log entry
    LogEntry(LogEntry),
    /// Flush all pending entries and signal completion
    Flush(Sender<()>),
}

/// Logger handed to every process and to the detector
///
/// A disabled logger drops everything without touching a channel.
pub struct EventLogger {
    sender: Option<Sender<LoggerCommand>>,
    path: Option<PathBuf>,
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("Warning: Failed to flush logs during EventLogger drop: {e:?}");
        }
    }
}

impl EventLogger {
    /// Create a logger that records nothing
    pub fn disabled() -> Self {
        EventLogger {
            sender: None,
            path: None,
        }
    }

    /// Create a logger that writes readable lines to stderr
    pub fn console() -> Self {
        let sender = spawn_writer(Box::new(io::stderr()), LogFormat::Text);
        EventLogger {
            sender: Some(sender),
            path: None,
        }
    }

    /// Create a new logger that writes JSON lines to the specified file
    ///
    /// # Arguments
    /// * `path` - Path to the log file. If the filename contains "{timestamp}",
    ///   it will be replaced with the current timestamp.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created or the file
    /// cannot be opened for writing.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();

        // Replace timestamp placeholder if present
        #[allow(clippy::literal_string_with_formatting_args)]
        let file_path = if path_buf.to_string_lossy().contains("{timestamp}") {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            PathBuf::from(
                path_buf
                    .to_string_lossy()
                    .replace("{timestamp}", &timestamp.to_string()),
            )
        } else {
            path_buf
        };

        if let Some(parent) = file_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)
            .with_context(|| format!("Failed to open log file {}", file_path.display()))?;

        let sender = spawn_writer(Box::new(file), LogFormat::Json);
        Ok(EventLogger {
            sender: Some(sender),
            path: Some(file_path),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Path of the log file, after placeholder substitution
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an event
    ///
    /// Non-blocking; a closed writer only produces a message on stderr.
    pub fn log(&self, actor: Actor, event: Event) {
        let Some(sender) = &self.sender else {
            return;
        };

        let now = Utc::now();
        let timestamp = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0;

        let entry = LogEntry {
            timestamp,
            severity: event.severity(),
            actor,
            event,
        };

        if let Err(e) = sender.send(LoggerCommand::LogEntry(entry)) {
            eprintln!("Failed to send log entry: {e:?}");
        }
    }

    pub fn log_process(&self, process_id: usize, event: Event) {
        self.log(Actor::Process(process_id), event);
    }

    pub fn log_detector(&self, event: Event) {
        self.log(Actor::Detector, event);
    }

    /// Force all pending entries to be written
    ///
    /// Blocks until the writer thread confirms the flush.
    ///
    /// # Errors
    /// Returns an error if the writer thread is gone or does not answer in time.
    pub fn flush(&self) -> Result<()> {
        let Some(sender) = &self.sender else {
            return Ok(());
        };

        let (flush_tx, flush_rx) = crossbeam_channel::bounded(1);
        sender
            .send(LoggerCommand::Flush(flush_tx))
            .map_err(|_| anyhow::anyhow!("Logger thread is no longer running"))?;

        flush_rx
            .recv_timeout(Duration::from_secs(10))
            .map_err(|_| anyhow::anyhow!("Flush operation timed out"))
    }
}

fn spawn_writer(sink: Box<dyn Write + Send>, format: LogFormat) -> Sender<LoggerCommand> {
    let (tx, rx) = unbounded::<LoggerCommand>();
    thread::spawn(move || async_logger_thread(sink, format, rx));
    tx
}

/// Writer loop: runs until every sender is dropped
fn async_logger_thread(
    sink: Box<dyn Write + Send>,
    format: LogFormat,
    rx: Receiver<LoggerCommand>,
) {
    let mut writer = BufWriter::new(sink);

    while let Ok(cmd) = rx.recv() {
        match cmd {
            LoggerCommand::LogEntry(entry) => {
                let line = match format {
                    LogFormat::Json => match serde_json::to_string(&entry) {
                        Ok(json) => json,
                        Err(e) => {
                            eprintln!("Logger serialization error: {e:?}");
                            continue;
                        }
                    },
                    LogFormat::Text => entry.text_line(),
                };
                if let Err(e) = writeln!(writer, "{line}") {
                    eprintln!("Logger write error: {e:?}");
                }
                // Keep the console responsive; files are flushed in batches
                if format == LogFormat::Text
                    && let Err(e) = writer.flush()
                {
                    eprintln!("Logger flush error: {e:?}");
                }
            }
            LoggerCommand::Flush(responder) => {
                if let Err(e) = writer.flush() {
                    eprintln!("Logger flush error: {e:?}");
                }
                let _ = responder.send(());
            }
        }
    }

    if let Err(e) = writer.flush() {
        eprintln!("Logger final flush error: {e:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LocalState;
    use tempfile::TempDir;

    #[test]
    fn test_basic_logging() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("basic.log");

        let logger = EventLogger::with_file(&log_path).unwrap();

        logger.log_process(1, Event::ProcessStarted);
        logger.log_process(1, Event::Attempt { resource: 10 });
        logger.log_process(1, Event::Acquired { resource: 10 });
        logger.log_process(1, Event::Released { resource: 10 });
        logger.log_process(1, Event::ProcessStopped);

        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("\"actor\":{\"process\":1}"));
        assert!(lines[0].contains("\"kind\":\"process_started\""));
        assert!(lines[2].contains("\"resource\":10"));
    }

    #[test]
    fn test_entries_carry_severity() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("severity.log");

        let logger = EventLogger::with_file(&log_path).unwrap();
        logger.log_process(2, Event::TimedOut { resource: 0 });
        logger.log_detector(Event::StateRecorded {
            snapshot_id: 1,
            state: LocalState::new([0], None),
        });
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines[0].contains("\"severity\":\"WARN\""));
        assert!(lines[1].contains("\"severity\":\"INFO\""));
        assert!(lines[1].contains("\"actor\":\"detector\""));
    }

    #[test]
    fn test_timestamp_placeholder_and_directory_creation() {
        let temp_dir = TempDir::new().unwrap();
        let pattern = temp_dir.path().join("nested/run_{timestamp}.log");

        let logger = EventLogger::with_file(&pattern).unwrap();
        let path = logger.path().unwrap().to_path_buf();
        assert!(!path.to_string_lossy().contains("{timestamp}"));
        assert!(path.exists());
    }

    #[test]
    fn test_disabled_logger_is_silent() {
        let logger = EventLogger::disabled();
        assert!(!logger.is_enabled());
        logger.log_detector(Event::NoDeadlock { snapshot_id: 1 });
        logger.flush().unwrap();
    }

    #[test]
    fn test_logger_drop_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("drop_test.log");

        {
            let logger = EventLogger::with_file(&log_path).unwrap();
            logger.log_process(1, Event::ProcessStarted);
        }

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("process_started"));
    }

    #[test]
    fn test_text_line_format() {
        let entry = LogEntry {
            timestamp: 0.5,
            severity: Severity::Warn,
            actor: Actor::Process(3),
            event: Event::TimedOut { resource: 1 },
        };
        let line = entry.text_line();
        assert!(line.starts_with("00:00:00.500 WARN "));
        assert!(line.contains("Process-3"));
        assert!(line.ends_with("could not acquire Resource-1, will keep trying"));
    }
}

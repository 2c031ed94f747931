//! Logging sinks
//!
//! The engine never logs through a process-wide global. A [`LogSink`] is
//! handed to the session at construction and shared with its connection and
//! worker through a cheap-to-clone [`Logger`].
//!
//! - [`TracingSink`] forwards to `tracing` (the default)
//! - [`MemorySink`] captures records, mainly for tests
//! - [`NullSink`] discards everything

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Leveled logging interface injected into a session
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn enabled(&self, _level: LogLevel) -> bool {
        true
    }
}

/// Forwards records to `tracing` under the `kinetic` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "kinetic", "{}", message),
            LogLevel::Debug => tracing::debug!(target: "kinetic", "{}", message),
            LogLevel::Info => tracing::info!(target: "kinetic", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "kinetic", "{}", message),
            LogLevel::Error => tracing::error!(target: "kinetic", "{}", message),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}

    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }
}

/// Captures every record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured records
    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().clone()
    }

    /// Whether any record at `level` contains `needle`
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        self.records.lock().push((level, message.to_string()));
    }
}

/// Shared handle to a sink
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        if self.sink.enabled(level) {
            self.sink.log(level, &message.to_string());
        }
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.log(LogLevel::Trace, message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

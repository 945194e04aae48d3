//! Injected logging capability
//!
//! The engine never talks to a concrete log destination. Hosts inject a
//! [`LogSink`] (console, file, syslog, whatever) and the engine routes all
//! diagnostics through it, prefixed with the watcher name.

use std::sync::{Arc, Mutex};

/// Severity level for engine diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Leveled logging sink injected by the host
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Sink that keeps messages in memory, mainly for tests and diagnostics
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().unwrap().clone()
    }

    /// True if any recorded message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(_, m)| m.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries.lock().unwrap().push((level, message.to_string()));
    }
}

/// Per-watcher logger that prefixes every message with the watcher name
#[derive(Clone)]
pub struct WatcherLog {
    name: String,
    sink: Arc<dyn LogSink>,
}

impl WatcherLog {
    pub fn new(name: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            name: name.into(),
            sink,
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.sink
            .log(LogLevel::Info, &format!("{}: {}", self.name, message.as_ref()));
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.sink
            .log(LogLevel::Debug, &format!("{}: {}", self.name, message.as_ref()));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.sink
            .log(LogLevel::Error, &format!("{}: {}", self.name, message.as_ref()));
    }
}

impl std::fmt::Debug for WatcherLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherLog")
            .field("name", &self.name)
            .finish()
    }
}

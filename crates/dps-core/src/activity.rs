//! Session activity log: a bounded ring of user-facing messages

use std::collections::VecDeque;
use std::fmt::Write as _;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Default number of retained entries
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// A single log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Local>,
    pub message: String,
}

/// How timestamps are rendered on export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStyle {
    /// `HH:MM:SS`
    Compact,
    /// `YYYY-MM-DD HH:MM:SS`
    Full,
}

/// Bounded, thread-safe log buffer
///
/// Every entry is mirrored to `tracing` so the same stream reaches whatever
/// subscriber the host installed.
#[derive(Debug)]
pub struct ActivityLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, dropping the oldest when full
    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!(target: "dps::activity", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "dps::activity", "{}", message),
            LogLevel::Error => tracing::error!(target: "dps::activity", "{}", message),
        }

        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            level,
            timestamp: Local::now(),
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(LogLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    /// Copy of every retained entry, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Plain-text export, one entry per line
    pub fn export_text(&self, style: TimestampStyle) -> String {
        let format = match style {
            TimestampStyle::Compact => "%H:%M:%S",
            TimestampStyle::Full => "%Y-%m-%d %H:%M:%S",
        };
        let mut out = String::new();
        for entry in self.entries.lock().iter() {
            let _ = writeln!(
                out,
                "[{}] {}: {}",
                entry.timestamp.format(format),
                entry.level.label(),
                entry.message
            );
        }
        out
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

//! Per-run log.
//!
//! Every stage reports progress through a [`RunLog`] owned by the run. Entries
//! are kept so the log ships with the run report, and each one is also
//! emitted as a `tracing` event for whatever subscriber the binary installed.

use serde::{Deserialize, Serialize};

/// Log level for report display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting depth under the enclosing stage.
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }
}

/// Ordered log of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry and forward it to `tracing`.
    pub fn log(&mut self, entry: LogEntry) {
        let indent = "   ".repeat(entry.indent as usize);
        match entry.level {
            LogLevel::Info => tracing::info!("{}{}", indent, entry.message),
            LogLevel::Success => tracing::info!("{}✓ {}", indent, entry.message),
            LogLevel::Warning => tracing::warn!("{}{}", indent, entry.message),
        }
        self.entries.push(entry);
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        self.log(LogEntry::info(msg));
    }

    pub fn success(&mut self, msg: impl Into<String>) {
        self.log(LogEntry::success(msg));
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.log(LogEntry::warning(msg));
    }

    pub fn info_indent(&mut self, msg: impl Into<String>, indent: u8) {
        self.log(LogEntry::info(msg).with_indent(indent));
    }

    pub fn warning_indent(&mut self, msg: impl Into<String>, indent: u8) {
        self.log(LogEntry::warning(msg).with_indent(indent));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_kept_in_order() {
        let mut log = RunLog::new();
        log.info("Scanning 3 records");
        log.warning_indent("Ambiguous match", 1);
        log.success("Done");

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].level, LogLevel::Warning);
        assert_eq!(entries[1].indent, 1);
        assert_eq!(log.count(LogLevel::Success), 1);
    }

    #[test]
    fn test_entry_serializes_lowercase_level() {
        let json = serde_json::to_value(LogEntry::warning("boom")).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["indent"], 0);
    }
}

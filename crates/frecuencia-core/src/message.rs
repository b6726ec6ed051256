//! Session Log
//!
//! Running log of system, user, assistant and error lines shown next to a
//! session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a log line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Session flow notices
    System,
    /// Text typed by the user
    User,
    /// AI assistant replies
    Assistant,
    /// Failures surfaced to the user
    Error,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single log line
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub sender: Sender,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded log; the oldest lines drop off once `capacity` is reached
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatLog {
    entries: Vec<LogEntry>,
    #[serde(default = "default_capacity")]
    capacity: usize,
}

const fn default_capacity() -> usize {
    200
}

impl Default for ChatLog {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            capacity: default_capacity(),
        }
    }
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    pub fn system(&mut self, text: impl Into<String>) {
        self.push(LogEntry::new(Sender::System, text));
    }

    pub fn user(&mut self, text: impl Into<String>) {
        self.push(LogEntry::new(Sender::User, text));
    }

    pub fn assistant(&mut self, text: impl Into<String>) {
        self.push(LogEntry::new(Sender::Assistant, text));
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(LogEntry::new(Sender::Error, text));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_lines() {
        let mut log = ChatLog::new();
        log.system("Bienvenido");
        log.user("hola");
        log.error("sin conexión");

        assert_eq!(log.len(), 3);
        assert_eq!(log.last().unwrap().sender, Sender::Error);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = ChatLog::with_capacity(2);
        log.system("a");
        log.system("b");
        log.system("c");

        let texts: Vec<_> = log.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["b", "c"]);
    }
}

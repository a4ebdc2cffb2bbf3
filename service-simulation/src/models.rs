use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of simulator activity a log line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogEventKind {
    Dns,
    Http,
}

impl LogEventKind {
    /// Classify a raw log line by substring match.
    ///
    /// Matching is case-sensitive and DNS is checked first, so a line that
    /// mentions both tokens is reported as DNS. Lines mentioning neither yield
    /// `None`.
    pub fn classify(line: &str) -> Option<Self> {
        if line.contains("DNS") {
            Some(LogEventKind::Dns)
        } else if line.contains("HTTP") {
            Some(LogEventKind::Http)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventKind::Dns => "DNS",
            LogEventKind::Http => "HTTP",
        }
    }
}

impl fmt::Display for LogEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified line from the simulator's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub kind: LogEventKind,
    pub raw_line: String,
    pub observed_at: DateTime<Utc>,
}

impl LogEvent {
    /// Build an event for `line`, or `None` when the line is irrelevant.
    /// Trailing line terminators are stripped from the stored line.
    pub fn from_line(line: &str) -> Option<Self> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        LogEventKind::classify(trimmed).map(|kind| Self {
            kind,
            raw_line: trimmed.to_string(),
            observed_at: Utc::now(),
        })
    }
}

/// Liveness of this service (not of the simulator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub status: String,
}

impl ServiceStatus {
    pub fn running() -> Self {
        Self {
            service: "simulation".to_string(),
            status: "running".to_string(),
        }
    }
}

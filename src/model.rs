use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LogQueryError;

/// A `.log` file found in the log directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl LogFile {
    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }
}

/// One physical line of a log file. `number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub number: usize,
    pub content: String,
}

/// A search hit from a cross-file search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatch {
    pub filename: String,
    pub line: LogLine,
}

/// Severity marker embedded in a line as `[LEVEL]`.
///
/// The declaration order is the classification priority used by the
/// summarizer and the display order of level counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityLevel {
    Error,
    Warn,
    Info,
    Debug,
    Critical,
}

impl SeverityLevel {
    pub const ALL: [SeverityLevel; 5] = [
        SeverityLevel::Error,
        SeverityLevel::Warn,
        SeverityLevel::Info,
        SeverityLevel::Debug,
        SeverityLevel::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SeverityLevel::Error => "ERROR",
            SeverityLevel::Warn => "WARN",
            SeverityLevel::Info => "INFO",
            SeverityLevel::Debug => "DEBUG",
            SeverityLevel::Critical => "CRITICAL",
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            SeverityLevel::Error => "[ERROR]",
            SeverityLevel::Warn => "[WARN]",
            SeverityLevel::Info => "[INFO]",
            SeverityLevel::Debug => "[DEBUG]",
            SeverityLevel::Critical => "[CRITICAL]",
        }
    }

    /// Exact, case-sensitive marker test.
    pub fn tags(self, line: &str) -> bool {
        line.contains(self.marker())
    }

    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityLevel {
    type Err = LogQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == upper)
            .ok_or_else(|| LogQueryError::InvalidLevel {
                level: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

/// Per-file aggregate produced by the summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSummary {
    pub filename: String,
    pub total_lines: usize,
    /// Non-zero counts only, in `SeverityLevel::ALL` order.
    pub levels: Vec<(SeverityLevel, usize)>,
    /// Highest counts first, ties in first-seen order.
    pub top_services: Vec<(String, usize)>,
}

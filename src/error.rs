use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogQueryError>;

#[derive(Debug, Error)]
pub enum LogQueryError {
    #[error("config error: {0}")]
    Config(String),

    #[error("File '{filename}' not found")]
    NotFound { filename: String },

    #[error("File '{filename}' not found (path must stay inside the log directory)")]
    PathEscape { filename: String },

    #[error("Invalid level '{level}'. Valid levels: {valid}")]
    InvalidLevel { level: String, valid: String },

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("file watch error: {path} - {reason}")]
    Watch { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LogQueryError {
    /// Conditions caused by caller input that are answered with a text
    /// report instead of a failed call.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            LogQueryError::NotFound { .. }
                | LogQueryError::PathEscape { .. }
                | LogQueryError::InvalidLevel { .. }
                | LogQueryError::InvalidPattern { .. }
        )
    }
}

use autom4b_config::ConfigError;
use autom4b_core::{BookKey, CoreError, ErrorSeverity};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InboxError {
    #[error("Inbox folder {path} does not exist")]
    InboxMissing { path: PathBuf },

    #[error("Inbox folder {path} is not readable: {source}")]
    InboxUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Inbox folder {path} is not writable: {source}")]
    InboxReadOnly {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Output folder {path} is not writable: {source}")]
    OutputUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Converter '{tool}' is not available: {reason}")]
    ConverterMissing { tool: String, reason: String },

    #[error("{key}: {reason}")]
    Rejected { key: BookKey, reason: String },

    #[error("{key}: flattening failed: {reason}")]
    FlattenFailed { key: BookKey, reason: String },

    #[error("{key}: conversion failed: {reason}")]
    ConversionFailed { key: BookKey, reason: String },

    #[error("Failed to persist failed-book state: {0}")]
    Persistence(String),

    #[error("Invalid match filter: {0}")]
    Filter(#[from] regex::Error),

    #[error("Book not tracked: {0}")]
    UnknownBook(BookKey),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Key(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InboxError {
    pub fn rejected(key: &BookKey, reason: impl Into<String>) -> Self {
        Self::Rejected {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    pub fn conversion_failed(key: &BookKey, reason: impl Into<String>) -> Self {
        Self::ConversionFailed {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Maps the error onto the process-wide failure taxonomy
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Rejected { .. }
            | Self::FlattenFailed { .. }
            | Self::ConversionFailed { .. }
            | Self::Json(_)
            | Self::Io(_) => ErrorSeverity::PerBook,
            Self::InboxMissing { .. }
            | Self::InboxUnreadable { .. }
            | Self::InboxReadOnly { .. }
            | Self::OutputUnwritable { .. }
            | Self::ConverterMissing { .. }
            | Self::Persistence(_)
            | Self::Filter(_)
            | Self::Config(_) => ErrorSeverity::Fatal,
            Self::UnknownBook(_) | Self::Key(_) => ErrorSeverity::Bug,
        }
    }

    pub fn is_per_book(&self) -> bool {
        self.severity() == ErrorSeverity::PerBook
    }

    /// Text recorded as the book's failure reason
    pub fn book_reason(&self) -> String {
        match self {
            Self::Rejected { reason, .. }
            | Self::FlattenFailed { reason, .. }
            | Self::ConversionFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InboxError>;
pub type InboxResult<T> = std::result::Result<T, InboxError>;

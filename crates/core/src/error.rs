//! Error types and the failure taxonomy for autom4b
//!
//! Failures fall into four tiers:
//! - **PerBook**: one book is rejected or failed to convert; recorded as state
//!   and retried automatically once the book's content changes
//! - **InboxSettling**: the inbox is still being written to; the loop waits
//! - **Fatal**: misconfiguration the loop cannot fix (inbox missing, output
//!   unwritable, converter not installed); aborts the process
//! - **Bug**: an invariant of the engine itself was violated

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Recovery actions associated with each severity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Leave the book failed until its content hash changes
    RetryOnChange,
    /// Sleep and poll again until the inbox stops changing
    WaitForSettle,
    /// Report to the operator and stop
    OperatorIntervention,
    /// Abort immediately
    Abort,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryOnChange => write!(f, "Will retry when the book changes"),
            Self::WaitForSettle => write!(f, "Waiting for the inbox to settle"),
            Self::OperatorIntervention => write!(f, "Operator intervention required"),
            Self::Abort => write!(f, "Aborting"),
        }
    }
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Affects a single book; the loop continues
    PerBook,
    /// The inbox is mid-copy; the loop waits
    InboxSettling,
    /// Process-level misconfiguration
    Fatal,
    /// Broken internal invariant
    Bug,
}

impl ErrorSeverity {
    /// Returns the default recovery action for this tier
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            Self::PerBook => RecoveryAction::RetryOnChange,
            Self::InboxSettling => RecoveryAction::WaitForSettle,
            Self::Fatal => RecoveryAction::OperatorIntervention,
            Self::Bug => RecoveryAction::Abort,
        }
    }

    /// Returns true if this severity must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal | Self::Bug)
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerBook => write!(f, "Per-book"),
            Self::InboxSettling => write!(f, "Inbox settling"),
            Self::Fatal => write!(f, "Fatal"),
            Self::Bug => write!(f, "Bug"),
        }
    }
}

/// Errors raised while constructing core domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A book key could not be normalized
    #[error("Invalid book key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A path does not live under the inbox root
    #[error("Path {path} is not inside the inbox {root}")]
    OutsideInbox { path: PathBuf, root: PathBuf },
}

impl CoreError {
    /// Creates an invalid key error
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Key construction errors are caller bugs
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Bug
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

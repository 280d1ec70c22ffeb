//! Per-book status state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an inbox item
///
/// ```text
/// new ──► ok ◄──► needs_retry ◄──► failed
///  │       │           │              │
///  └───────┴───────────┴──────────────┴──► gone (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxStatus {
    /// First observation; eligible like `Ok`
    New,
    /// Eligible for processing
    Ok,
    /// Previously failed, content changed since
    NeedsRetry,
    /// Rejected or conversion failed; skipped until content changes
    Failed,
    /// Path no longer exists
    Gone,
}

impl InboxStatus {
    /// Returns true if `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: InboxStatus) -> bool {
        match (self, next) {
            (Self::Gone, _) => false,
            (_, Self::New) => false,
            _ => true,
        }
    }

    /// Statuses the loop may hand to the converter
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::New | Self::Ok | Self::NeedsRetry)
    }

    pub fn is_failed(self) -> bool {
        self == Self::Failed
    }

    pub fn is_gone(self) -> bool {
        self == Self::Gone
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Ok => "ok",
            Self::NeedsRetry => "needs_retry",
            Self::Failed => "failed",
            Self::Gone => "gone",
        }
    }
}

impl fmt::Display for InboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Shared domain types for autom4b
//!
//! Every crate in the workspace speaks in these types: the canonical
//! [`BookKey`] identifying a book in the inbox, the [`ContentHash`] fingerprint
//! used for change detection, the [`InboxStatus`] state machine and the
//! [`BookStructure`] classification tags.

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, ErrorSeverity, RecoveryAction, Result};
pub use types::{BookKey, BookStructure, ContentHash, InboxStatus, Timestamp};

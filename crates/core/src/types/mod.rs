//! Domain types for autom4b
//!
//! - `key`: canonical book identity inside the inbox
//! - `hash`: content fingerprints for change detection
//! - `status`: the per-book state machine
//! - `structure`: directory layout classification tags
//! - `common`: timestamps

mod common;
mod hash;
mod key;
mod status;
mod structure;

// Re-export all public types
pub use common::Timestamp;
pub use hash::ContentHash;
pub use key::BookKey;
pub use status::InboxStatus;
pub use structure::BookStructure;

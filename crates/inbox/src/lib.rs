//! Inbox reconciliation for autom4b
//!
//! This crate watches an inbox folder of audiobooks and decides, for every
//! book in it, whether it can be converted as-is, needs flattening first or
//! must be left for the operator:
//!
//! - [`probe`]: audio file discovery, content hashing and settle detection
//! - [`structure`]: book structure classification and the ordering gates
//! - [`InboxItem`] / [`InboxState`]: the per-book state machine and the
//!   registry that reconciles it with the filesystem
//! - [`failed_store`]: failed books that survive a restart
//! - [`InboxProcessor`]: the polling loop that drives everything
//!
//! # Example
//!
//! ```rust,no_run
//! use autom4b_config::Config;
//! use autom4b_inbox::{EnvFailedBookStore, InboxProcessor, M4bToolConverter};
//! use std::sync::Arc;
//!
//! # async fn example() -> autom4b_inbox::InboxResult<()> {
//! let config = Config::default();
//! let store = EnvFailedBookStore::new(config.conversion.failed_books_var.clone());
//! let converter = Arc::new(M4bToolConverter::new(config.conversion.m4b_tool.clone()));
//!
//! let mut processor = InboxProcessor::new(config, Box::new(store), converter)?;
//! processor.startup_checks()?;
//! processor.run().await?;
//! # Ok(())
//! # }
//! ```

mod conversion;
mod error;
mod item;
mod processor;
mod state;
mod workdirs;

pub mod converter;
pub mod failed_store;
pub mod flatten;
pub mod metadata;
pub mod probe;
pub mod structure;

pub use conversion::{BookConversion, ConversionOutcome};
pub use converter::{ConversionJob, ConversionOutput, Converter, M4bToolConverter};
pub use error::{InboxError, InboxResult};
pub use failed_store::{
    EnvFailedBookStore, FailedBookStore, FailedRecord, FailedSnapshot, MemoryFailedBookStore,
};
pub use item::InboxItem;
pub use metadata::BookMetadata;
pub use probe::AudioExtensions;
pub use processor::{CycleReport, InboxProcessor, SkipReason};
pub use state::{InboxCounts, InboxState, MatchFilter};
pub use structure::{Classification, ClassifyOptions, Verdict};
pub use workdirs::WorkingDirs;

pub use autom4b_core::{BookKey, BookStructure, ContentHash, InboxStatus, Timestamp};

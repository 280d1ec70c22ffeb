//! Per-book state record

use crate::probe::{self, AudioExtensions};
use autom4b_core::{BookKey, ContentHash, InboxStatus, Timestamp};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One candidate book in the inbox and everything known about it
///
/// Owned exclusively by [`InboxState`](crate::InboxState); callers look items
/// up by key each cycle instead of holding on to them.
#[derive(Debug, Clone)]
pub struct InboxItem {
    key: BookKey,
    path: PathBuf,
    current_hash: Option<ContentHash>,
    previous_hash: Option<ContentHash>,
    hash_changed_at: Option<Instant>,
    last_updated_at: Option<Timestamp>,
    status: InboxStatus,
    failed_reason: Option<String>,
    failed_hash: Option<ContentHash>,
    failed_last_updated: Option<Timestamp>,
    converted_hash: Option<ContentHash>,
    size: u64,
}

impl InboxItem {
    pub fn new(key: BookKey, root: &Path) -> Self {
        let path = key.to_path(root);
        Self {
            key,
            path,
            current_hash: None,
            previous_hash: None,
            hash_changed_at: None,
            last_updated_at: None,
            status: InboxStatus::New,
            failed_reason: None,
            failed_hash: None,
            failed_last_updated: None,
            converted_hash: None,
            size: 0,
        }
    }

    pub fn key(&self) -> &BookKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> InboxStatus {
        self.status
    }

    /// `None` until the first [`refresh`](Self::refresh)
    pub fn current_hash(&self) -> Option<ContentHash> {
        self.current_hash
    }

    pub fn previous_hash(&self) -> Option<ContentHash> {
        self.previous_hash
    }

    pub fn hash_changed_at(&self) -> Option<Instant> {
        self.hash_changed_at
    }

    pub fn last_updated_at(&self) -> Option<Timestamp> {
        self.last_updated_at
    }

    pub fn failed_reason(&self) -> Option<&str> {
        self.failed_reason.as_deref()
    }

    /// Last-modified time recorded when the book failed
    pub fn failed_last_updated(&self) -> Option<Timestamp> {
        self.failed_last_updated
    }

    /// Aggregate size of the book's audio files
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_gone(&self) -> bool {
        self.status.is_gone()
    }

    pub fn is_file(&self) -> bool {
        self.path.is_file()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Flips the item to `gone` if its path has disappeared
    ///
    /// Returns true if the item is gone.
    pub fn check_gone(&mut self) -> bool {
        if !self.is_gone() && !self.exists() {
            debug!("{} disappeared from the inbox", self.key);
            self.mark_gone();
        }
        self.is_gone()
    }

    fn mark_gone(&mut self) {
        self.status = InboxStatus::Gone;
        self.current_hash = None;
        self.size = 0;
    }

    /// Re-reads the book's files
    ///
    /// Returns true if the content hash changed. Gone items are never
    /// refreshed.
    pub fn refresh(&mut self, extensions: &AudioExtensions) -> bool {
        if self.check_gone() {
            debug_assert!(self.current_hash.is_none(), "gone item {} has a hash", self.key);
            return false;
        }

        let files = probe::audio_files(&self.path, extensions);
        let hash = probe::hash_files(&files);
        self.size = files.iter().map(|f| f.size).sum();
        self.last_updated_at = probe::last_modified(&self.path);

        match self.current_hash {
            Some(current) if current == hash => false,
            current => {
                if current.is_some() {
                    self.previous_hash = current;
                    self.hash_changed_at = Some(Instant::now());
                }
                self.current_hash = Some(hash);
                current.is_some()
            }
        }
    }

    /// True if the book's content differs from when it failed
    pub fn changed_since_failure(&self) -> bool {
        if !self.status.is_failed() {
            return false;
        }
        match (self.failed_hash, self.current_hash) {
            (Some(failed), Some(current)) => failed != current,
            // Restored before the first refresh: only mtimes to go on
            (None, _) => self
                .failed_last_updated
                .map(|failed| self.modified_after(failed))
                .unwrap_or(false),
            (Some(_), None) => false,
        }
    }

    fn transition(&mut self, next: InboxStatus) -> bool {
        if self.is_gone() {
            debug!("Ignoring {} on gone item {}", next, self.key);
            return false;
        }
        if !self.status.can_transition_to(next) {
            warn!("Rejected transition {} -> {} for {}", self.status, next, self.key);
            debug_assert!(false, "invalid transition {} -> {}", self.status, next);
            return false;
        }
        self.status = next;
        true
    }

    /// Marks the book failed; no-op once gone
    pub fn set_failed(&mut self, reason: impl Into<String>) -> bool {
        if !self.transition(InboxStatus::Failed) {
            return false;
        }
        self.failed_reason = Some(reason.into());
        self.failed_hash = self.current_hash;
        self.failed_last_updated = self.last_updated_at.or_else(|| Some(Timestamp::now()));
        true
    }

    /// Marks a failed book for another attempt, keeping the failure record
    pub fn set_needs_retry(&mut self) -> bool {
        self.transition(InboxStatus::NeedsRetry)
    }

    /// Clears all failure state
    pub fn set_ok(&mut self) -> bool {
        if !self.transition(InboxStatus::Ok) {
            return false;
        }
        self.failed_reason = None;
        self.failed_hash = None;
        self.failed_last_updated = None;
        true
    }

    /// Re-applies a failure recorded before a restart
    ///
    /// The persisted record has no hash. If the book was not modified after
    /// `last_updated`, the current hash is pinned as the failure hash so later
    /// changes (including renames, which keep mtimes) are detected by hash.
    pub(crate) fn restore_failure(&mut self, reason: String, last_updated: Timestamp) -> bool {
        if !self.transition(InboxStatus::Failed) {
            return false;
        }
        let modified = self.modified_after(last_updated);
        self.failed_reason = Some(reason);
        self.failed_hash = if modified { None } else { self.current_hash };
        self.failed_last_updated = Some(last_updated);
        true
    }

    fn modified_after(&self, time: Timestamp) -> bool {
        self.last_updated_at.map(|now| now > time).unwrap_or(false)
    }

    /// Records that the current content was converted successfully
    pub(crate) fn mark_converted(&mut self) {
        self.converted_hash = self.current_hash;
    }

    /// True if the current content has already been converted
    pub fn is_converted(&self) -> bool {
        self.converted_hash.is_some() && self.converted_hash == self.current_hash
    }
}

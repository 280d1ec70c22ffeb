//! The inbox registry
//!
//! `InboxState` owns every [`InboxItem`], the inbox-wide fingerprint and the
//! match filter. It is constructed explicitly and handed to the processing
//! loop; there is one per process. Derived views (matched, failed, ok, ...)
//! are computed by scanning the registry, which holds at most a few hundred
//! entries.

use crate::error::{InboxError, Result};
use crate::failed_store::{FailedBookStore, FailedRecord, FailedSnapshot};
use crate::item::InboxItem;
use crate::probe::{self, AudioExtensions, Candidate};
use crate::structure::{classify_layout, Layout};
use autom4b_config::Config;
use autom4b_core::{BookKey, BookStructure, ContentHash, InboxStatus, Timestamp};
use log::{debug, info, warn};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Case-insensitive pattern restricting which books are processed
#[derive(Debug, Clone)]
pub struct MatchFilter {
    pattern: String,
    regex: Regex,
}

impl MatchFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, key: &BookKey) -> bool {
        self.regex.is_match(key.as_str())
    }
}

/// Registry sizes for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxCounts {
    pub total: usize,
    pub matched: usize,
    pub filtered: usize,
    pub ok: usize,
    pub needs_retry: usize,
    pub failed: usize,
}

impl fmt::Display for InboxCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} books ({} ok, {} to retry, {} failed",
            self.matched, self.ok, self.needs_retry, self.failed
        )?;
        if self.filtered > 0 {
            write!(f, ", {} filtered out", self.filtered)?;
        }
        write!(f, ")")
    }
}

pub struct InboxState {
    root: PathBuf,
    extensions: AudioExtensions,
    convert_series: bool,
    items: BTreeMap<BookKey, InboxItem>,
    global_hash: Option<ContentHash>,
    previous_global_hash: Option<ContentHash>,
    global_hash_changed_at: Option<Instant>,
    match_filter: Option<MatchFilter>,
    ready: bool,
    store: Box<dyn FailedBookStore>,
}

impl InboxState {
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: AudioExtensions,
        store: Box<dyn FailedBookStore>,
    ) -> Self {
        Self {
            root: root.into(),
            extensions,
            convert_series: false,
            items: BTreeMap::new(),
            global_hash: None,
            previous_global_hash: None,
            global_hash_changed_at: None,
            match_filter: None,
            ready: false,
            store,
        }
    }

    pub fn from_config(config: &Config, store: Box<dyn FailedBookStore>) -> Result<Self> {
        let mut state = Self::new(
            config.paths.inbox_dir.clone(),
            AudioExtensions::new(config.conversion.normalized_extensions()),
            store,
        )
        .with_convert_series(config.conversion.convert_series);
        state.set_match_filter(config.conversion.match_filter.as_deref())?;
        Ok(state)
    }

    /// Expand series folders into one item per book
    pub fn with_convert_series(mut self, enabled: bool) -> Self {
        self.convert_series = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extensions(&self) -> &AudioExtensions {
        &self.extensions
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Populates the registry on first use and prunes gone items afterwards
    ///
    /// On first population, failures persisted by a previous process are
    /// restored. An inaccessible inbox is an error, an empty one is not.
    pub fn init(&mut self) -> Result<()> {
        if self.items.is_empty() {
            self.scan()?;
            self.restore_failures()?;
        } else {
            self.check_root()?;
            self.prune_gone()?;
        }
        self.refresh_global_hash();
        self.ready = true;
        Ok(())
    }

    fn check_root(&self) -> Result<()> {
        probe::candidate_books(&self.root, &self.extensions).map(|_| ())
    }

    /// Reconciles the registry with the filesystem
    ///
    /// Adds new candidates, refreshes every item's hash, re-promotes failed
    /// books whose content changed and drops items whose path is gone.
    /// Returns the keys added by this scan.
    pub fn scan(&mut self) -> Result<Vec<BookKey>> {
        let candidates = probe::candidate_books(&self.root, &self.extensions)?;

        let mut added = Vec::new();
        for candidate in &candidates {
            for key in self.expand_candidate(candidate)? {
                if !self.items.contains_key(&key) {
                    debug!("Tracking new book {}", key);
                    self.items
                        .insert(key.clone(), InboxItem::new(key.clone(), &self.root));
                    added.push(key);
                }
            }
        }

        let mut retried = false;
        for item in self.items.values_mut() {
            item.refresh(&self.extensions);
            if item.changed_since_failure() && item.set_needs_retry() {
                info!("{} changed since it failed, will retry", item.key());
                retried = true;
            }
        }

        let persisted = self.prune_gone()?;
        if retried && !persisted {
            self.persist()?;
        }
        Ok(added)
    }

    fn expand_candidate(&self, candidate: &Candidate) -> Result<Vec<BookKey>> {
        let key = BookKey::from_path(&self.root, candidate.path())?;
        let dir = match candidate {
            Candidate::Dir(dir) if self.convert_series => dir,
            _ => return Ok(vec![key]),
        };

        let layout = Layout::analyze(dir, &self.extensions);
        if classify_layout(&layout, true) != BookStructure::Series {
            return Ok(vec![key]);
        }

        // A parent that is already tracked keeps its identity
        if self.items.contains_key(&key) {
            return Ok(vec![key]);
        }

        layout
            .groups
            .iter()
            .map(|group| BookKey::from_path(&self.root, &group.path).map_err(InboxError::from))
            .collect()
    }

    /// Removes items whose path no longer exists
    ///
    /// Returns true if the failed-book snapshot was persisted.
    fn prune_gone(&mut self) -> Result<bool> {
        let mut had_failures = false;
        self.items.retain(|key, item| {
            let was_failed = item.status().is_failed();
            if item.check_gone() {
                info!("{} is gone from the inbox", key);
                had_failures |= was_failed;
                false
            } else {
                true
            }
        });

        if had_failures {
            self.persist()?;
        }
        Ok(had_failures)
    }

    fn restore_failures(&mut self) -> Result<()> {
        let snapshot = self.store.load()?;
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut restored = 0;
        for (key, record) in snapshot {
            let item = match self.items.get_mut(&key) {
                Some(item) => item,
                None => {
                    debug!("Persisted failure for {} no longer in the inbox", key);
                    continue;
                }
            };
            if !item.restore_failure(record.reason, record.last_updated) {
                continue;
            }
            restored += 1;
            if item.changed_since_failure() && item.set_needs_retry() {
                info!("{} changed since it failed, will retry", key);
            }
        }

        if restored > 0 {
            info!("Restored {} failed books from the previous run", restored);
        }
        Ok(())
    }

    /// Recomputes the inbox-wide fingerprint
    ///
    /// Returns true if it differs from the previous value. Calling it again
    /// without filesystem changes returns false.
    pub fn refresh_global_hash(&mut self) -> bool {
        let hash = probe::hash_audio_files(&self.root, &self.extensions);
        match self.global_hash {
            Some(current) if current == hash => false,
            current => {
                self.previous_global_hash = current;
                self.global_hash_changed_at = Some(Instant::now());
                self.global_hash = Some(hash);
                true
            }
        }
    }

    /// Fingerprint from the last [`refresh_global_hash`](Self::refresh_global_hash)
    pub fn global_hash(&self) -> Option<ContentHash> {
        self.global_hash
    }

    pub fn previous_global_hash(&self) -> Option<ContentHash> {
        self.previous_global_hash
    }

    pub fn global_hash_changed_at(&self) -> Option<Instant> {
        self.global_hash_changed_at
    }

    /// Builds a key from an absolute path or a path relative to the inbox
    pub fn key_for(&self, path: &Path) -> Result<BookKey> {
        Ok(BookKey::from_path(&self.root, path)?)
    }

    pub fn get(&self, key: &BookKey) -> Option<&InboxItem> {
        self.items.get(key)
    }

    pub fn get_path(&self, path: &Path) -> Option<&InboxItem> {
        self.key_for(path).ok().and_then(|key| self.items.get(&key))
    }

    fn item_mut(&mut self, key: &BookKey) -> Result<&mut InboxItem> {
        self.items
            .get_mut(key)
            .ok_or_else(|| InboxError::UnknownBook(key.clone()))
    }

    /// Marks a book failed and persists the failure
    ///
    /// Returns false if the item is gone.
    pub fn set_failed(&mut self, key: &BookKey, reason: impl Into<String>) -> Result<bool> {
        let item = self.item_mut(key)?;
        item.check_gone();
        let applied = item.set_failed(reason);
        if applied {
            self.persist()?;
        }
        Ok(applied)
    }

    pub fn set_needs_retry(&mut self, key: &BookKey) -> Result<bool> {
        let item = self.item_mut(key)?;
        item.check_gone();
        let applied = item.set_needs_retry();
        if applied {
            self.persist()?;
        }
        Ok(applied)
    }

    pub fn set_ok(&mut self, key: &BookKey) -> Result<bool> {
        let item = self.item_mut(key)?;
        item.check_gone();
        let was_failed = item.status().is_failed();
        let applied = item.set_ok();
        if applied && was_failed {
            self.persist()?;
        }
        Ok(applied)
    }

    /// Re-reads one item, e.g. after it was flattened
    pub fn refresh_item(&mut self, key: &BookKey) -> Result<bool> {
        let extensions = self.extensions.clone();
        Ok(self.item_mut(key)?.refresh(&extensions))
    }

    /// Stops tracking a book; the next scan rediscovers its folder
    ///
    /// Used when a tracked folder turns out to be a series, so the scan can
    /// expand it into its child books.
    pub fn untrack(&mut self, key: &BookKey) -> Result<()> {
        let item = self
            .items
            .remove(key)
            .ok_or_else(|| InboxError::UnknownBook(key.clone()))?;
        if item.status().is_failed() {
            self.persist()?;
        }
        Ok(())
    }

    pub(crate) fn mark_converted(&mut self, key: &BookKey) -> Result<()> {
        self.item_mut(key)?.mark_converted();
        Ok(())
    }

    pub fn match_filter(&self) -> Option<&MatchFilter> {
        self.match_filter.as_ref()
    }

    /// Restricts processing to books whose key matches `pattern`
    ///
    /// Clearing the filter marks previously filtered new books ok.
    pub fn set_match_filter(&mut self, pattern: Option<&str>) -> Result<()> {
        let filter = pattern
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(MatchFilter::new)
            .transpose()?;

        if filter.is_none() {
            if let Some(old) = self.match_filter.take() {
                for item in self.items.values_mut() {
                    if !old.is_match(item.key()) && item.status() == InboxStatus::New {
                        item.set_ok();
                    }
                }
            }
        }

        match &filter {
            Some(f) => info!("Match filter set to '{}'", f.as_str()),
            None => debug!("Match filter cleared"),
        }
        self.match_filter = filter;
        Ok(())
    }

    pub fn is_filtered(&self, item: &InboxItem) -> bool {
        self.match_filter
            .as_ref()
            .map(|f| !f.is_match(item.key()))
            .unwrap_or(false)
    }

    fn view<F>(&self, predicate: F) -> Vec<&InboxItem>
    where
        F: Fn(&InboxItem) -> bool,
    {
        self.items
            .values()
            .filter(|item| !item.is_gone() && !self.is_filtered(item))
            .filter(|item| predicate(item))
            .collect()
    }

    /// Tracked books that pass the match filter, in key order
    pub fn matched_books(&self) -> Vec<&InboxItem> {
        self.view(|_| true)
    }

    pub fn failed_books(&self) -> Vec<&InboxItem> {
        self.view(|item| item.status().is_failed())
    }

    pub fn ok_books(&self) -> Vec<&InboxItem> {
        self.view(|item| matches!(item.status(), InboxStatus::New | InboxStatus::Ok))
    }

    pub fn needs_retry_books(&self) -> Vec<&InboxItem> {
        self.view(|item| item.status() == InboxStatus::NeedsRetry)
    }

    /// Books that may be processed this cycle
    pub fn eligible_books(&self) -> Vec<&InboxItem> {
        self.view(|item| item.status().is_eligible())
    }

    pub fn is_eligible(&self, key: &BookKey) -> bool {
        self.items.get(key).is_some_and(|item| {
            !item.is_gone() && !self.is_filtered(item) && item.status().is_eligible()
        })
    }

    /// Tracked books excluded by the match filter
    pub fn filtered_books(&self) -> Vec<&InboxItem> {
        self.items
            .values()
            .filter(|item| !item.is_gone() && self.is_filtered(item))
            .collect()
    }

    pub fn counts(&self) -> InboxCounts {
        InboxCounts {
            total: self.items.len(),
            matched: self.matched_books().len(),
            filtered: self.filtered_books().len(),
            ok: self.ok_books().len(),
            needs_retry: self.needs_retry_books().len(),
            failed: self.failed_books().len(),
        }
    }

    /// Folders whose children are tracked as separate books
    pub fn series_parents(&self) -> Vec<BookKey> {
        self.items
            .values()
            .filter(|item| !item.is_gone())
            .filter_map(|item| item.key().parent())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn series_children(&self, parent: &BookKey) -> Vec<&InboxItem> {
        self.items
            .values()
            .filter(|item| !item.is_gone() && item.key().parent().as_ref() == Some(parent))
            .collect()
    }

    /// Current failures in the persisted format
    pub fn failed_snapshot(&self) -> FailedSnapshot {
        self.items
            .values()
            .filter(|item| item.status().is_failed())
            .map(|item| {
                (
                    item.key().clone(),
                    FailedRecord {
                        last_updated: item.failed_last_updated().unwrap_or_else(Timestamp::now),
                        reason: item.failed_reason().unwrap_or_default().to_string(),
                    },
                )
            })
            .collect()
    }

    fn persist(&mut self) -> Result<()> {
        let snapshot = self.failed_snapshot();
        if let Err(e) = self.store.save(&snapshot) {
            warn!("Could not persist failed books: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Forgets every item and cached hash
    pub fn reset(&mut self) {
        self.items.clear();
        self.global_hash = None;
        self.previous_global_hash = None;
        self.global_hash_changed_at = None;
        self.ready = false;
    }
}

impl fmt::Debug for InboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboxState")
            .field("root", &self.root)
            .field("items", &self.items.len())
            .field("global_hash", &self.global_hash)
            .field("ready", &self.ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failed_store::MemoryFailedBookStore;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative.as_bytes()).unwrap();
    }

    fn state_for(root: &Path) -> InboxState {
        InboxState::new(
            root,
            AudioExtensions::default(),
            Box::new(MemoryFailedBookStore::new()),
        )
    }

    fn key(raw: &str) -> BookKey {
        BookKey::new(raw).unwrap()
    }

    #[test]
    fn test_init_populates_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BookA/1.mp3");
        touch(temp.path(), "BookB/1.mp3");

        let mut state = state_for(temp.path());
        assert!(!state.is_ready());
        state.init().unwrap();
        assert!(state.is_ready());
        assert_eq!(state.len(), 2);
        let hash = state.global_hash();

        state.init().unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.global_hash(), hash);
    }

    #[test]
    fn test_unreadable_inbox_is_fatal() {
        let temp = TempDir::new().unwrap();
        let mut state = state_for(&temp.path().join("missing"));
        let err = state.init().unwrap_err();
        assert!(err.severity().is_fatal());
    }

    #[test]
    fn test_empty_inbox_is_fine() {
        let temp = TempDir::new().unwrap();
        let mut state = state_for(temp.path());
        state.init().unwrap();
        assert!(state.is_empty());
        assert_eq!(state.global_hash(), Some(ContentHash::EMPTY));
    }

    #[test]
    fn test_global_hash_change_is_idempotent() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BookA/1.mp3");
        let mut state = state_for(temp.path());

        assert!(state.refresh_global_hash());
        assert!(!state.refresh_global_hash());
        assert!(!state.refresh_global_hash());

        let first = state.global_hash();
        touch(temp.path(), "BookA/2.mp3");
        assert!(state.refresh_global_hash());
        assert!(!state.refresh_global_hash());
        assert_eq!(state.previous_global_hash(), first);
    }

    #[test]
    fn test_lookup_by_key_and_path() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BookA/1.mp3");
        let mut state = state_for(temp.path());
        state.init().unwrap();

        let by_key = state.get(&key("BookA")).unwrap();
        let by_abs = state.get_path(&temp.path().join("BookA")).unwrap();
        let by_rel = state.get_path(Path::new("BookA")).unwrap();
        assert_eq!(by_key.key(), by_abs.key());
        assert_eq!(by_key.key(), by_rel.key());

        // An item reference resolves through its own key
        let again = state.get(by_key.key()).unwrap();
        assert_eq!(again.path(), temp.path().join("BookA"));
        assert!(state.get_path(Path::new("/elsewhere/BookA")).is_none());
    }

    #[test]
    fn test_failure_retry_lifecycle() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BookA/1.mp3");
        let mut state = state_for(temp.path());
        state.init().unwrap();
        let book = key("BookA");

        assert!(state.set_failed(&book, "broken").unwrap());
        state.scan().unwrap();
        assert_eq!(state.get(&book).unwrap().status(), InboxStatus::Failed);
        assert!(state.eligible_books().is_empty());

        touch(temp.path(), "BookA/2.mp3");
        state.scan().unwrap();
        assert_eq!(state.get(&book).unwrap().status(), InboxStatus::NeedsRetry);
        assert_eq!(state.eligible_books().len(), 1);
    }

    #[test]
    fn test_gone_items() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BookA/1.mp3");
        touch(temp.path(), "BookB/1.mp3");
        let mut state = state_for(temp.path());
        state.init().unwrap();

        fs::remove_dir_all(temp.path().join("BookA")).unwrap();
        let gone = key("BookA");
        assert!(!state.set_failed(&gone, "too late").unwrap());
        assert!(!state.set_ok(&gone).unwrap());
        assert!(!state.set_needs_retry(&gone).unwrap());
        assert_eq!(state.get(&gone).unwrap().status(), InboxStatus::Gone);

        let matched: Vec<&str> = state.matched_books().iter().map(|i| i.key().as_str()).collect();
        assert_eq!(matched, vec!["BookB"]);
        assert!(state.failed_books().is_empty());
        assert_eq!(state.ok_books().len(), 1);

        state.init().unwrap();
        assert!(state.get(&gone).is_none());
    }

    #[test]
    fn test_match_filter_round_trip() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "Dune/1.mp3");
        touch(temp.path(), "Emma/1.mp3");
        touch(temp.path(), "Hamlet/1.mp3");
        let mut state = state_for(temp.path());
        state.init().unwrap();
        state.set_failed(&key("Hamlet"), "broken").unwrap();

        state.set_match_filter(Some("dune")).unwrap();
        assert_eq!(state.len(), 3);
        let eligible: Vec<&str> = state.eligible_books().iter().map(|i| i.key().as_str()).collect();
        assert_eq!(eligible, vec!["Dune"]);
        assert_eq!(state.filtered_books().len(), 2);

        state.set_match_filter(None).unwrap();
        assert_eq!(state.get(&key("Emma")).unwrap().status(), InboxStatus::Ok);
        assert_eq!(state.get(&key("Hamlet")).unwrap().status(), InboxStatus::Failed);
        assert_eq!(state.eligible_books().len(), 2);
    }

    #[test]
    fn test_invalid_match_filter() {
        let temp = TempDir::new().unwrap();
        let mut state = state_for(temp.path());
        assert!(state.set_match_filter(Some("(unclosed")).is_err());
    }

    #[test]
    fn test_failures_are_persisted() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BookA/1.mp3");
        let store = MemoryFailedBookStore::new();
        let mut state = InboxState::new(
            temp.path(),
            AudioExtensions::default(),
            Box::new(store.clone()),
        );
        state.init().unwrap();

        state.set_failed(&key("BookA"), "broken").unwrap();
        assert_eq!(store.snapshot()[&key("BookA")].reason, "broken");

        state.set_ok(&key("BookA")).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_restart_restores_failures() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BookA/1.mp3");
        touch(temp.path(), "BookB/1.mp3");
        let store = MemoryFailedBookStore::new();

        let mut state = InboxState::new(
            temp.path(),
            AudioExtensions::default(),
            Box::new(store.clone()),
        );
        state.init().unwrap();
        state.set_failed(&key("BookB"), "multi-disc book").unwrap();
        drop(state);

        let mut restarted = InboxState::new(
            temp.path(),
            AudioExtensions::default(),
            Box::new(store.clone()),
        );
        restarted.init().unwrap();
        let failed = restarted.failed_books();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key().as_str(), "BookB");
        assert_eq!(failed[0].failed_reason(), Some("multi-disc book"));
    }

    #[test]
    fn test_restored_failure_retried_after_rename() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "Rome/Part IX.mp3");
        touch(temp.path(), "Rome/Part V.mp3");
        let store = MemoryFailedBookStore::new();

        let mut state = InboxState::new(
            temp.path(),
            AudioExtensions::default(),
            Box::new(store.clone()),
        );
        state.init().unwrap();
        state.set_failed(&key("Rome"), "roman numerals").unwrap();
        drop(state);

        let mut restarted = InboxState::new(
            temp.path(),
            AudioExtensions::default(),
            Box::new(store.clone()),
        );
        restarted.init().unwrap();
        assert_eq!(restarted.get(&key("Rome")).unwrap().status(), InboxStatus::Failed);

        // Renames keep mtimes
        restarted.scan().unwrap();
        assert_eq!(restarted.get(&key("Rome")).unwrap().status(), InboxStatus::Failed);
        fs::rename(temp.path().join("Rome/Part IX.mp3"), temp.path().join("Rome/Part 09.mp3"))
            .unwrap();
        fs::rename(temp.path().join("Rome/Part V.mp3"), temp.path().join("Rome/Part 05.mp3"))
            .unwrap();

        restarted.scan().unwrap();
        assert_eq!(
            restarted.get(&key("Rome")).unwrap().status(),
            InboxStatus::NeedsRetry
        );
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_retry_persisted_when_another_book_is_pruned() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "A/1.mp3");
        touch(temp.path(), "B/1.mp3");
        let store = MemoryFailedBookStore::new();
        let mut state = InboxState::new(
            temp.path(),
            AudioExtensions::default(),
            Box::new(store.clone()),
        );
        state.init().unwrap();
        state.set_failed(&key("A"), "broken").unwrap();
        assert!(store.snapshot().contains_key(&key("A")));

        touch(temp.path(), "A/2.mp3");
        fs::remove_dir_all(temp.path().join("B")).unwrap();
        state.scan().unwrap();

        assert_eq!(state.get(&key("A")).unwrap().status(), InboxStatus::NeedsRetry);
        assert!(state.get(&key("B")).is_none());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_series_expansion() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "Saga/Book 1/1.mp3");
        touch(temp.path(), "Saga/Book 2/1.mp3");
        touch(temp.path(), "Single/1.mp3");

        let mut state = state_for(temp.path()).with_convert_series(true);
        state.init().unwrap();

        let keys: Vec<&str> = state.matched_books().iter().map(|i| i.key().as_str()).collect();
        assert_eq!(keys, vec!["Saga/Book 1", "Saga/Book 2", "Single"]);
        assert_eq!(state.series_parents(), vec![key("Saga")]);
        assert_eq!(state.series_children(&key("Saga")).len(), 2);
        assert!(state.series_children(&key("Single")).is_empty());
    }

    #[test]
    fn test_reset() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BookA/1.mp3");
        let mut state = state_for(temp.path());
        state.init().unwrap();

        state.reset();
        assert!(state.is_empty());
        assert!(state.global_hash().is_none());
        assert!(!state.is_ready());
    }
}

//! The polling loop
//!
//! One cycle: wait for the inbox to settle, reconcile the registry, then
//! take each eligible book in key order through classification, optional
//! flattening and conversion. A book's failure is recorded on the book and
//! never ends the cycle; fatal errors end the loop.

use crate::conversion::{BookConversion, ConversionOutcome};
use crate::converter::Converter;
use crate::error::{InboxError, Result};
use crate::failed_store::FailedBookStore;
use crate::flatten::{flatten_book, wrap_standalone_file};
use crate::probe::{self, Candidate};
use crate::state::{InboxCounts, InboxState};
use crate::structure::{assess, ClassifyOptions, Verdict};
use crate::workdirs::WorkingDirs;
use autom4b_config::Config;
use autom4b_core::{BookKey, ContentHash, ErrorSeverity, InboxStatus};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Why a cycle did not look at any book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No audio files anywhere in the inbox
    EmptyInbox,
    /// Nothing changed since the last processed cycle
    Unchanged,
    /// Shutdown was requested before processing started
    Interrupted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyInbox => write!(f, "inbox is empty"),
            SkipReason::Unchanged => write!(f, "no changes"),
            SkipReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Result of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub loop_number: u32,
    pub skipped: Option<SkipReason>,
    pub converted: Vec<BookKey>,
    /// Already converted with overwrite mode `skip`
    pub already_converted: Vec<BookKey>,
    pub failed: Vec<(BookKey, String)>,
    /// Subset of `failed` that had been promoted to `needs_retry`
    pub failed_again: Vec<BookKey>,
    pub flattened: Vec<BookKey>,
    /// Folders handed back to the scan to be split into their books
    pub split: Vec<BookKey>,
    pub counts: InboxCounts,
}

impl CycleReport {
    fn new(loop_number: u32) -> Self {
        Self {
            loop_number,
            ..Default::default()
        }
    }

    fn skipped(mut self, reason: SkipReason) -> Self {
        self.skipped = Some(reason);
        self
    }

    pub fn did_work(&self) -> bool {
        !self.converted.is_empty() || !self.failed.is_empty() || !self.flattened.is_empty()
    }
}

enum BookResult {
    Done(ConversionOutcome),
    Split,
    Gone,
}

/// Drives [`InboxState`] and the converter
pub struct InboxProcessor {
    config: Config,
    state: InboxState,
    converter: Arc<dyn Converter>,
    workdirs: WorkingDirs,
    last_processed_hash: Option<ContentHash>,
    last_reported_hash: Option<ContentHash>,
    loops: u32,
    shutdown: Option<watch::Receiver<bool>>,
}

impl InboxProcessor {
    pub fn new(
        config: Config,
        store: Box<dyn FailedBookStore>,
        converter: Arc<dyn Converter>,
    ) -> Result<Self> {
        let state = InboxState::from_config(&config, store)?;
        let workdirs = WorkingDirs::from_paths(&config.paths);
        Ok(Self {
            config,
            state,
            converter,
            workdirs,
            last_processed_hash: None,
            last_reported_hash: None,
            loops: 0,
            shutdown: None,
        })
    }

    /// Stops the loop between books once the channel carries `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> &InboxState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut InboxState {
        &mut self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loops(&self) -> u32 {
        self.loops
    }

    /// Verifies the environment before the first cycle
    ///
    /// Every failure here is fatal: the inbox must exist and accept writes,
    /// output folders must be writable, the converter must run, and stale
    /// scratch directories are wiped.
    pub fn startup_checks(&self) -> Result<()> {
        let inbox = &self.config.paths.inbox_dir;
        probe::check_inbox(inbox)?;
        tempfile::tempfile_in(inbox).map_err(|source| InboxError::InboxReadOnly {
            path: inbox.clone(),
            source,
        })?;

        for dir in self.config.paths.output_dirs() {
            check_writable(&dir)?;
        }

        self.converter.check_available()?;
        self.workdirs.clean()?;
        info!("Watching {}", inbox.display());
        Ok(())
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Sleeps for `duration`; returns false if shutdown was requested
    async fn pause(&mut self, duration: Duration) -> bool {
        let rx = match self.shutdown.as_mut() {
            Some(rx) => rx,
            None => {
                tokio::time::sleep(duration).await;
                return true;
            }
        };
        if *rx.borrow() {
            return false;
        }

        let changed = tokio::select! {
            _ = tokio::time::sleep(duration) => None,
            result = rx.changed() => Some(result.is_ok()),
        };
        match changed {
            None => true,
            Some(true) => !*rx.borrow(),
            Some(false) => {
                // Sender dropped, nobody can ask us to stop any more
                self.shutdown = None;
                true
            }
        }
    }

    /// Blocks while files in the inbox are still being written
    async fn wait_for_settle(&mut self) -> bool {
        let root = self.config.paths.inbox_dir.clone();
        let window = self.config.app.wait_time();
        let poll = self.config.app.settle_poll();

        let mut announced = false;
        while probe::is_recently_modified(&root, window) {
            if !announced {
                info!(
                    "{} was modified recently. {}",
                    root.display(),
                    ErrorSeverity::InboxSettling.recovery_action()
                );
                announced = true;
            }
            if !self.pause(poll).await {
                return false;
            }
        }
        if announced {
            debug!("Inbox settled");
        }
        true
    }

    fn wrap_standalone_files(&self) -> Result<()> {
        let root = &self.config.paths.inbox_dir;
        for candidate in probe::candidate_books(root, self.state.extensions())? {
            if let Candidate::File(file) = candidate {
                if let Err(e) = wrap_standalone_file(&file) {
                    warn!("Could not move {} into a folder: {}", file.display(), e);
                }
            }
        }
        Ok(())
    }

    /// Runs one full cycle
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.loops += 1;
        let mut report = CycleReport::new(self.loops);
        let root = self.config.paths.inbox_dir.clone();

        probe::check_inbox(&root)?;
        if probe::count_audio_files(&root, self.state.extensions()) == 0 {
            if !self.state.is_empty() {
                self.state.init()?;
            } else {
                self.state.refresh_global_hash();
            }
            let hash = self.state.global_hash();
            if hash != self.last_reported_hash {
                info!("No audio files in {}, waiting for books", root.display());
                self.last_reported_hash = hash;
            }
            report.counts = self.state.counts();
            return Ok(report.skipped(SkipReason::EmptyInbox));
        }

        if !self.wait_for_settle().await {
            return Ok(report.skipped(SkipReason::Interrupted));
        }

        self.wrap_standalone_files()?;
        self.state.init()?;
        self.state.refresh_global_hash();

        let hash = self.state.global_hash();
        if hash.is_some() && hash == self.last_processed_hash {
            debug!("Inbox unchanged since the last cycle");
            report.counts = self.state.counts();
            return Ok(report.skipped(SkipReason::Unchanged));
        }

        self.state.scan()?;
        self.last_processed_hash = hash;
        self.last_reported_hash = hash;

        let mut queue: VecDeque<BookKey> = self
            .state
            .eligible_books()
            .into_iter()
            .filter(|item| !item.is_converted())
            .map(|item| item.key().clone())
            .collect();
        debug!("{} books eligible this cycle", queue.len());

        while let Some(key) = queue.pop_front() {
            if self.is_shutting_down() {
                info!("Shutdown requested, stopping before {}", key);
                break;
            }

            let retrying = self
                .state
                .get(&key)
                .map(|item| item.status() == InboxStatus::NeedsRetry)
                .unwrap_or(false);

            match self.process_book(&key, &mut report).await {
                Ok(BookResult::Done(outcome)) => {
                    self.state.set_ok(&key)?;
                    self.state.mark_converted(&key)?;
                    match outcome {
                        ConversionOutcome::Converted(_) => report.converted.push(key),
                        ConversionOutcome::AlreadyConverted(_) => {
                            report.already_converted.push(key)
                        }
                    }
                }
                Ok(BookResult::Split) => {
                    // The children go next, ahead of the rest of the queue
                    let children = self.track_series_children(&key)?;
                    for child in children.into_iter().rev() {
                        queue.push_front(child);
                    }
                    report.split.push(key);
                }
                Ok(BookResult::Gone) => {}
                Err(e) if e.is_per_book() => {
                    let reason = e.book_reason();
                    if self.state.set_failed(&key, reason.clone())? {
                        if retrying {
                            error!("{} failed again: {}", key, reason);
                            report.failed_again.push(key.clone());
                        } else {
                            error!("{} failed: {}", key, reason);
                        }
                        report.failed.push((key, reason));
                    }
                }
                Err(e) => {
                    debug_assert!(
                        e.severity() != ErrorSeverity::Bug,
                        "internal error while processing {}: {}",
                        key,
                        e
                    );
                    return Err(e);
                }
            }
        }

        self.workdirs.clean()?;
        report.counts = self.state.counts();
        Ok(report)
    }

    async fn process_book(&mut self, key: &BookKey, report: &mut CycleReport) -> Result<BookResult> {
        let path = match self.state.get(key) {
            Some(item) if item.exists() => item.path().to_path_buf(),
            _ => {
                debug!("{} vanished before processing", key);
                return Ok(BookResult::Gone);
            }
        };

        let options = ClassifyOptions {
            flatten_multi_disc: self.config.conversion.flatten_multi_disc_books,
            convert_series: self.config.conversion.convert_series,
        };
        let mut classification = assess(&path, self.state.extensions(), options);
        debug!("{} looks like a {} book", key, classification.structure);

        match classification.verdict {
            Verdict::Accept => {}
            Verdict::Reject(reason) => return Err(InboxError::rejected(key, reason)),
            Verdict::SplitSeries => {
                info!("{} is a series, converting each book separately", key);
                self.state.untrack(key)?;
                return Ok(BookResult::Split);
            }
            Verdict::Flatten => {
                flatten_book(key, &path)?;
                report.flattened.push(key.clone());
                self.state.refresh_item(key)?;

                classification = assess(&path, self.state.extensions(), options);
                if let Verdict::Reject(reason) = classification.verdict {
                    return Err(InboxError::rejected(key, reason));
                }
            }
        }

        let expected_size = self.state.get(key).map(|item| item.size()).unwrap_or(0);
        let conversion = BookConversion {
            key: key.clone(),
            source: path,
            expected_size,
            extensions: self.state.extensions().clone(),
            conversion: self.config.conversion.clone(),
            paths: self.config.paths.clone(),
            workdirs: self.workdirs.clone(),
            converter: Arc::clone(&self.converter),
        };

        let outcome = tokio::task::spawn_blocking(move || conversion.run())
            .await
            .map_err(|e| InboxError::conversion_failed(key, format!("conversion task failed: {}", e)))??;
        Ok(BookResult::Done(outcome))
    }

    /// Rescans after `parent` was untracked and returns its eligible books
    fn track_series_children(&mut self, parent: &BookKey) -> Result<Vec<BookKey>> {
        let added = self.state.scan()?;
        let children: Vec<BookKey> = added
            .into_iter()
            .filter(|key| key.is_descendant_of(parent) && self.state.is_eligible(key))
            .collect();
        debug!("{} split into {} books", parent, children.len());
        Ok(children)
    }

    /// Runs cycles until shutdown or `app.max_loops`
    ///
    /// Returns the number of cycles run.
    pub async fn run(&mut self) -> Result<u32> {
        self.run_with(|_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_cycle` after every cycle
    pub async fn run_with<F>(&mut self, mut on_cycle: F) -> Result<u32>
    where
        F: FnMut(&CycleReport),
    {
        let sleep_time = self.config.app.sleep_time();
        loop {
            if self.is_shutting_down() {
                break;
            }

            let report = self.run_cycle().await?;
            on_cycle(&report);

            if let Some(max) = self.config.app.max_loops {
                if self.loops >= max {
                    info!("Reached the loop limit ({}), exiting", max);
                    break;
                }
            }
            if !self.pause(sleep_time).await {
                break;
            }
        }
        info!("Stopped after {} cycles", self.loops);
        Ok(self.loops)
    }
}

fn check_writable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .and_then(|_| tempfile::tempfile_in(dir).map(|_| ()))
        .map_err(|source| InboxError::OutputUnwritable {
            path: dir.to_path_buf(),
            source,
        })
}

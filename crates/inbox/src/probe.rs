//! Read-only filesystem probes: audio enumeration, content hashing,
//! recent-modification checks and candidate discovery.
//!
//! The inbox is mutated by other processes while these run. A path that
//! vanishes mid-walk is treated as holding no files, never as an error.

use crate::error::{InboxError, Result};
use autom4b_core::{ContentHash, Timestamp};
use log::{debug, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// Case-insensitive audio extension allowlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtensions {
    extensions: HashSet<String>,
}

impl AudioExtensions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for AudioExtensions {
    fn default() -> Self {
        Self::new(["mp3", "m4a", "m4b", "wma"])
    }
}

/// One audio file observed under a probed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub path: PathBuf,
    /// `/`-separated path relative to the probed root
    pub relative: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// A top-level entry in the inbox that may be a book
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Candidate {
    Dir(PathBuf),
    File(PathBuf),
}

impl Candidate {
    pub fn path(&self) -> &Path {
        match self {
            Candidate::Dir(path) | Candidate::File(path) => path,
        }
    }
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Walks `path` skipping hidden files and everything inside hidden folders
///
/// The starting path is always walked, even if its own name is hidden.
fn visible_entries(path: &Path) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()))
}

fn relative_string(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        parts.join("/")
    }
}

/// Lists audio files under `path` (or `path` itself if it is an audio file),
/// sorted by relative path
pub fn audio_files(path: &Path, extensions: &AudioExtensions) -> Vec<AudioFile> {
    let mut files = Vec::new();

    for entry in visible_entries(path) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", path.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if !extensions.matches(entry.path()) {
            continue;
        }

        // Files can disappear between listing and stat
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };

        files.push(AudioFile {
            path: entry.path().to_path_buf(),
            relative: relative_string(path, entry.path()),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    files
}

pub fn count_audio_files(path: &Path, extensions: &AudioExtensions) -> usize {
    audio_files(path, extensions).len()
}

/// Aggregate byte size of the audio files under `path`
pub fn audio_size(path: &Path, extensions: &AudioExtensions) -> u64 {
    audio_files(path, extensions).iter().map(|f| f.size).sum()
}

/// Fingerprint over the (relative path, size, mtime) set of audio files
///
/// Returns [`ContentHash::EMPTY`] when there are no audio files.
pub fn hash_audio_files(path: &Path, extensions: &AudioExtensions) -> ContentHash {
    hash_files(&audio_files(path, extensions))
}

pub(crate) fn hash_files(files: &[AudioFile]) -> ContentHash {
    if files.is_empty() {
        return ContentHash::EMPTY;
    }

    let mut entries: Vec<&AudioFile> = files.iter().collect();
    entries.sort_by(|a, b| a.relative.cmp(&b.relative));

    let mut buffer = Vec::new();
    for file in entries {
        let mtime_ns = file
            .modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_nanos();
        buffer.extend_from_slice(file.relative.as_bytes());
        buffer.push(0);
        buffer.extend_from_slice(&file.size.to_le_bytes());
        buffer.extend_from_slice(&mtime_ns.to_le_bytes());
        buffer.push(b'\n');
    }
    ContentHash::from_digest(md5::compute(&buffer).0)
}

/// Latest modification time among all files under `path`
pub fn last_modified(path: &Path) -> Option<Timestamp> {
    visible_entries(path)
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok()?.modified().ok())
        .max()
        .map(Timestamp::from_system_time)
}

/// True if any file under `path` was modified within `window` of now
pub fn is_recently_modified(path: &Path, window: Duration) -> bool {
    if window.is_zero() {
        return false;
    }
    match last_modified(path) {
        Some(latest) => latest.elapsed_since(Timestamp::now()) < window,
        None => false,
    }
}

fn read_inbox(root: &Path) -> Result<fs::ReadDir> {
    fs::read_dir(root).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            InboxError::InboxMissing {
                path: root.to_path_buf(),
            }
        } else {
            InboxError::InboxUnreadable {
                path: root.to_path_buf(),
                source: e,
            }
        }
    })
}

/// Fails if the inbox is missing or cannot be listed
pub fn check_inbox(root: &Path) -> Result<()> {
    read_inbox(root).map(|_| ())
}

/// Enumerates the non-hidden top-level entries of `root` that hold audio
///
/// An unreadable root is fatal; an empty root is not.
pub fn candidate_books(root: &Path, extensions: &AudioExtensions) -> Result<Vec<Candidate>> {
    let entries = read_inbox(root)?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error reading inbox entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            if count_audio_files(&path, extensions) > 0 {
                candidates.push(Candidate::Dir(path));
            }
        } else if file_type.is_file() && extensions.matches(&path) {
            candidates.push(Candidate::File(path));
        }
    }

    candidates.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(candidates)
}

//! Persistence of failed books across restarts
//!
//! The snapshot is a JSON object in an environment variable (by default
//! `FAILED_BOOKS`), optionally mirrored into a `.env` file so the next
//! process launch sees it:
//!
//! ```text
//! FAILED_BOOKS="{\"BookB\":{\"last_updated\":1700000000000,\"reason\":\"multi-disc book\"}}"
//! ```
//!
//! A bare number per key is accepted on read as the last-updated time.

use crate::error::{InboxError, Result};
use autom4b_core::{BookKey, Timestamp};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

const LEGACY_REASON: &str = "failed before restart (no reason recorded)";

/// A failure that must survive a restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Latest modification time of the book when it failed
    pub last_updated: Timestamp,
    pub reason: String,
}

pub type FailedSnapshot = BTreeMap<BookKey, FailedRecord>;

/// Where the failed-book snapshot lives between runs
pub trait FailedBookStore: Send {
    fn load(&self) -> Result<FailedSnapshot>;

    fn save(&mut self, snapshot: &FailedSnapshot) -> Result<()>;
}

/// Parses a stored snapshot, accepting the legacy number-only format
pub fn parse_snapshot(raw: &str) -> Result<FailedSnapshot> {
    let value: Value = serde_json::from_str(raw)?;
    let object = match value {
        Value::Object(object) => object,
        Value::Null => return Ok(FailedSnapshot::new()),
        other => {
            return Err(InboxError::Persistence(format!(
                "expected a JSON object, found {}",
                other
            )))
        }
    };

    let mut snapshot = FailedSnapshot::new();
    for (key, value) in object {
        let key = match BookKey::new(key.as_str()) {
            Ok(key) => key,
            Err(e) => {
                warn!("Dropping persisted failure with bad key: {}", e);
                continue;
            }
        };

        let record = match value {
            Value::Number(number) => {
                let raw = number.as_f64().unwrap_or(0.0);
                // Legacy values were seconds since the epoch
                let millis = if raw < 1e11 { raw * 1000.0 } else { raw };
                FailedRecord {
                    last_updated: Timestamp::from_millis(millis as i64),
                    reason: LEGACY_REASON.to_string(),
                }
            }
            other => serde_json::from_value(other)?,
        };
        snapshot.insert(key, record);
    }
    Ok(snapshot)
}

pub fn render_snapshot(snapshot: &FailedSnapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Keeps the snapshot in a process environment variable and, if configured,
/// in a `.env` file
pub struct EnvFailedBookStore {
    var: String,
    env_file: Option<PathBuf>,
}

impl EnvFailedBookStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            env_file: None,
        }
    }

    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn var(&self) -> &str {
        &self.var
    }

    fn write_env_file(&self, path: &Path, rendered: &str) -> Result<()> {
        let line = format!("{}=\"{}\"", self.var, escape_env_value(rendered));
        let prefix = format!("{}=", self.var);

        let existing = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.persist_error(path, e)),
        };

        let mut replaced = false;
        let mut lines: Vec<String> = existing
            .lines()
            .map(|l| {
                let trimmed = l.trim_start();
                let bare = trimmed.strip_prefix("export ").unwrap_or(trimmed);
                if bare.starts_with(&prefix) {
                    replaced = true;
                    line.clone()
                } else {
                    l.to_string()
                }
            })
            .collect();
        if !replaced {
            lines.push(line);
        }
        let mut contents = lines.join("\n");
        contents.push('\n');

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| self.persist_error(path, e))?;
        temp.write_all(contents.as_bytes())
            .and_then(|_| temp.flush())
            .map_err(|e| self.persist_error(path, e))?;
        temp.persist(path)
            .map_err(|e| self.persist_error(path, e.error))?;
        Ok(())
    }

    fn persist_error(&self, path: &Path, e: std::io::Error) -> InboxError {
        InboxError::Persistence(format!("{}: {}", path.display(), e))
    }
}

fn escape_env_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

impl FailedBookStore for EnvFailedBookStore {
    fn load(&self) -> Result<FailedSnapshot> {
        let raw = match std::env::var(&self.var) {
            Ok(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(FailedSnapshot::new()),
        };

        match parse_snapshot(&raw) {
            Ok(snapshot) => {
                debug!("Loaded {} failed books from {}", snapshot.len(), self.var);
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", self.var, e);
                Ok(FailedSnapshot::new())
            }
        }
    }

    fn save(&mut self, snapshot: &FailedSnapshot) -> Result<()> {
        let rendered = render_snapshot(snapshot)?;
        std::env::set_var(&self.var, &rendered);
        if let Some(path) = &self.env_file {
            self.write_env_file(path, &rendered)?;
        }
        Ok(())
    }
}

/// In-memory store; clones share the same snapshot
#[derive(Debug, Clone, Default)]
pub struct MemoryFailedBookStore {
    snapshot: Arc<Mutex<FailedSnapshot>>,
}

impl MemoryFailedBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FailedSnapshot {
        self.snapshot
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl FailedBookStore for MemoryFailedBookStore {
    fn load(&self) -> Result<FailedSnapshot> {
        Ok(self.snapshot())
    }

    fn save(&mut self, snapshot: &FailedSnapshot) -> Result<()> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| InboxError::Persistence("snapshot lock poisoned".to_string()))?;
        *guard = snapshot.clone();
        Ok(())
    }
}

//! Canonical book identity

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Path of a book relative to the inbox root, `/`-separated
///
/// Keys are built once at the API boundary (from a string, a path, or an
/// existing item) and never recomputed for the lifetime of the item they name.
/// Ordering is plain string ordering, which gives the alphabetical processing
/// order used by the loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookKey(String);

impl BookKey {
    /// Normalizes a relative key such as `Author - Title` or `Series/Book 2`
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let raw = key.into();
        if Path::new(&raw).is_absolute() || raw.starts_with('/') {
            return Err(CoreError::invalid_key(raw, "must be relative to the inbox"));
        }

        let normalized = raw.replace('\\', "/");
        let parts: Vec<&str> = normalized
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();

        if parts.is_empty() {
            return Err(CoreError::invalid_key(raw, "must not be empty"));
        }
        if parts.contains(&"..") {
            return Err(CoreError::invalid_key(raw, "must not leave the inbox"));
        }

        Ok(Self(parts.join("/")))
    }

    /// Resolves an absolute path, a path starting with the inbox root, or a
    /// path relative to the inbox root into a key
    pub fn from_path(root: &Path, path: &Path) -> Result<Self> {
        let relative = if let Ok(stripped) = path.strip_prefix(root) {
            stripped
        } else if path.is_absolute() {
            return Err(CoreError::OutsideInbox {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            });
        } else {
            path
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(CoreError::invalid_key(
                        relative.display().to_string(),
                        "must be a plain relative path",
                    ))
                }
            }
        }

        Self::new(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this book under `root`
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }

    /// Last path component (the book folder or file name)
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Key of the enclosing folder, if this key is nested
    pub fn parent(&self) -> Option<BookKey> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| BookKey(parent.to_string()))
    }

    /// True if `self` lies strictly below `ancestor`
    pub fn is_descendant_of(&self, ancestor: &BookKey) -> bool {
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(&ancestor.0)
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for BookKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for BookKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for BookKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for BookKey {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BookKey> for String {
    fn from(key: BookKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_separators() {
        let key = BookKey::new("Series\\Book 1/").unwrap();
        assert_eq!(key.as_str(), "Series/Book 1");

        let key = BookKey::new("./Author - Title").unwrap();
        assert_eq!(key.as_str(), "Author - Title");
    }

    #[test]
    fn test_new_rejects_invalid() {
        assert!(BookKey::new("").is_err());
        assert!(BookKey::new("/abs/path").is_err());
        assert!(BookKey::new("a/../b").is_err());
        assert!(BookKey::new("./").is_err());
    }

    #[test]
    fn test_from_absolute_path() {
        let root = Path::new("/data/inbox");
        let key = BookKey::from_path(root, Path::new("/data/inbox/Series/Book 2")).unwrap();
        assert_eq!(key.as_str(), "Series/Book 2");
        assert_eq!(key.to_path(root), PathBuf::from("/data/inbox/Series/Book 2"));
    }

    #[test]
    fn test_from_relative_path() {
        let root = Path::new("/data/inbox");
        let key = BookKey::from_path(root, Path::new("BookA")).unwrap();
        assert_eq!(key.as_str(), "BookA");
    }

    #[test]
    fn test_from_path_outside_root() {
        let root = Path::new("/data/inbox");
        let err = BookKey::from_path(root, Path::new("/data/other/BookA")).unwrap_err();
        assert!(matches!(err, CoreError::OutsideInbox { .. }));
        assert!(BookKey::from_path(root, root).is_err());
    }

    #[test]
    fn test_name_and_parent() {
        let key = BookKey::new("Series/Book 2").unwrap();
        assert_eq!(key.name(), "Book 2");
        assert_eq!(key.parent(), Some(BookKey::new("Series").unwrap()));

        let top = BookKey::new("BookA").unwrap();
        assert_eq!(top.name(), "BookA");
        assert_eq!(top.parent(), None);
    }

    #[test]
    fn test_is_descendant_of() {
        let parent = BookKey::new("Series").unwrap();
        assert!(BookKey::new("Series/Book 1").unwrap().is_descendant_of(&parent));
        assert!(!BookKey::new("Series 2/Book 1").unwrap().is_descendant_of(&parent));
        assert!(!parent.is_descendant_of(&parent));
    }

    #[test]
    fn test_ordering_is_alphabetical() {
        let mut keys = vec![
            BookKey::new("b").unwrap(),
            BookKey::new("A").unwrap(),
            BookKey::new("a").unwrap(),
        ];
        keys.sort();
        let names: Vec<_> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["A", "a", "b"]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let key = BookKey::new("Series/Book 1").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"Series/Book 1\"");
        let back: BookKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<BookKey>("\"../x\"").is_err());
    }
}

//! Content fingerprints

use std::fmt;

/// Fingerprint over a set of audio files (paths, sizes, modification times)
///
/// [`ContentHash::EMPTY`] is the fixed value for "no audio files found". A
/// value that has not been computed yet is represented as `Option::None` by
/// the holders of a hash, never by a sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Hash of an empty audio file set
    pub const EMPTY: Self = Self([0u8; 16]);

    /// Wraps a 128-bit digest
    pub fn from_digest(digest: [u8; 16]) -> Self {
        Self(digest)
    }

    /// Returns true if this is the empty-set sentinel
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First 8 hex characters, for log lines
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

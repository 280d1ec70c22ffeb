//! Book directory layout tags

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a book's audio files are arranged on disk
///
/// Computed fresh on every classification; never cached, since flattening
/// mutates the directory mid-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStructure {
    /// A single audio file, not a directory
    Standalone,
    /// All audio directly in the book root
    Flat,
    /// All audio inside exactly one subdirectory
    FlatNested,
    /// Audio split across disc-numbered subdirectories
    MultiDisc,
    /// Several subdirectories that look like separate books
    MultiBook,
    /// Like `MultiBook`, with series conversion enabled
    Series,
    /// Audio both in the root and in subdirectories
    Mixed,
    Unknown,
}

impl BookStructure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Flat => "flat",
            Self::FlatNested => "flat_nested",
            Self::MultiDisc => "multi_disc",
            Self::MultiBook => "multi_book",
            Self::Series => "series",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }

    /// Layouts that can be fixed by moving nested files up
    pub fn is_flattenable(self) -> bool {
        matches!(self, Self::FlatNested | Self::MultiDisc)
    }

    /// Layouts with audio in two or more subdirectories
    pub fn is_multi_dir(self) -> bool {
        matches!(self, Self::MultiDisc | Self::MultiBook | Self::Series)
    }
}

impl fmt::Display for BookStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

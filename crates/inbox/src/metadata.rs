//! Best-effort tag probe for the converter

use crate::probe::{audio_files, AudioExtensions};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use log::debug;
use std::path::Path;

/// Tag fields and audio properties sampled from a book's first audio file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub narrator: Option<String>,
    pub year: Option<String>,
    pub comment: Option<String>,
    /// Kilobits per second
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
}

impl BookMetadata {
    /// Metadata with only the title set
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Author for the output file: artist, falling back to album artist
    pub fn author(&self) -> Option<&str> {
        self.artist.as_deref().or(self.album_artist.as_deref())
    }
}

fn non_empty(value: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn tag_string(tag: &Tag, key: &ItemKey) -> Option<String> {
    tag.get_string(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads metadata for the book at `dir`
///
/// Unreadable or untagged files yield the folder name as title and nothing
/// else. Never fails.
pub fn probe_book_metadata(dir: &Path, extensions: &AudioExtensions) -> BookMetadata {
    let folder_title = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut metadata = BookMetadata::titled(folder_title);

    let sample = match audio_files(dir, extensions).into_iter().next() {
        Some(file) => file.path,
        None => return metadata,
    };

    let tagged_file = match Probe::open(&sample).and_then(|probe| probe.read()) {
        Ok(file) => file,
        Err(e) => {
            debug!("No readable tags in {}: {}", sample.display(), e);
            return metadata;
        }
    };

    let properties = tagged_file.properties();
    metadata.bitrate = properties.audio_bitrate();
    metadata.sample_rate = properties.sample_rate();

    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => tag,
        None => return metadata,
    };

    metadata.artist = non_empty(tag.artist());
    metadata.album = non_empty(tag.album());
    metadata.comment = non_empty(tag.comment());
    metadata.album_artist = tag_string(tag, &ItemKey::AlbumArtist);
    metadata.narrator = tag_string(tag, &ItemKey::Composer);
    metadata.year =
        tag_string(tag, &ItemKey::Year).or_else(|| tag_string(tag, &ItemKey::RecordingDate));

    // Album is the book title for most rips; track titles are chapters
    if let Some(album) = &metadata.album {
        metadata.title = album.clone();
    }

    metadata
}

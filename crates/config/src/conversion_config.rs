//! Conversion and inbox-policy configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do when the converted folder already holds a book of the same name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OverwriteMode {
    /// Keep the existing file and fail the book
    Skip,
    /// Replace the existing file and log it
    Overwrite,
    /// Replace the existing file quietly
    OverwriteSilent,
}

impl fmt::Display for OverwriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverwriteMode::Skip => write!(f, "skip"),
            OverwriteMode::Overwrite => write!(f, "overwrite"),
            OverwriteMode::OverwriteSilent => write!(f, "overwrite-silent"),
        }
    }
}

impl FromStr for OverwriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "skip" | "n" | "no" | "false" => Ok(OverwriteMode::Skip),
            "overwrite" | "y" | "yes" | "true" => Ok(OverwriteMode::Overwrite),
            "overwrite-silent" => Ok(OverwriteMode::OverwriteSilent),
            other => Err(format!(
                "'{}' is not one of skip, overwrite, overwrite-silent",
                other
            )),
        }
    }
}

/// What happens to the source folder after a successful conversion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OnComplete {
    /// Move the source into the archive directory
    Archive,
    /// Delete the source
    Delete,
    /// Leave the source in the inbox (test runs)
    TestDoNothing,
}

impl fmt::Display for OnComplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnComplete::Archive => write!(f, "archive"),
            OnComplete::Delete => write!(f, "delete"),
            OnComplete::TestDoNothing => write!(f, "test-do-nothing"),
        }
    }
}

impl FromStr for OnComplete {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "archive" | "move" => Ok(OnComplete::Archive),
            "delete" => Ok(OnComplete::Delete),
            "test-do-nothing" | "nothing" => Ok(OnComplete::TestDoNothing),
            other => Err(format!(
                "'{}' is not one of archive, delete, test-do-nothing",
                other
            )),
        }
    }
}

/// Inbox policy and converter settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversionConfig {
    /// Extensions (without the dot) that count as audio
    pub audio_extensions: Vec<String>,

    /// Auto-flatten multi-disc books when chapter order survives it
    pub flatten_multi_disc_books: bool,

    /// Convert each book of a series folder independently
    pub convert_series: bool,

    /// Only books whose key matches this pattern are processed
    pub match_filter: Option<String>,

    pub overwrite_mode: OverwriteMode,

    pub on_complete: OnComplete,

    /// Copy each book to the backup directory before converting
    pub backup: bool,

    /// Parallel jobs handed to the converter
    pub cpu_cores: usize,

    /// Chapter length bounds in the converter's `min,max` seconds format
    pub max_chapter_length: String,

    /// Name chapters after source files instead of tags
    pub use_filenames_as_chapters: bool,

    /// Converter executable
    pub m4b_tool: String,

    /// Environment variable holding the failed-book snapshot
    pub failed_books_var: String,
}

impl ConversionConfig {
    /// Extensions normalized to lowercase without a leading dot
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.audio_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            audio_extensions: vec![
                "mp3".to_string(),
                "m4a".to_string(),
                "m4b".to_string(),
                "wma".to_string(),
            ],
            flatten_multi_disc_books: false,
            convert_series: false,
            match_filter: None,
            overwrite_mode: OverwriteMode::Skip,
            on_complete: OnComplete::Archive,
            backup: true,
            cpu_cores: 2,
            max_chapter_length: "15,30".to_string(),
            use_filenames_as_chapters: false,
            m4b_tool: "m4b-tool".to_string(),
            failed_books_var: "FAILED_BOOKS".to_string(),
        }
    }
}

impl ConfigSection for ConversionConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::in_range(self.cpu_cores, 1, 256, "conversion.cpu_cores"),
            Validator::not_empty(&self.m4b_tool, "conversion.m4b_tool"),
            Validator::not_empty(&self.failed_books_var, "conversion.failed_books_var"),
        ];

        if self.audio_extensions.is_empty() {
            results.push(Err(ValidationError::new(
                "conversion.audio_extensions",
                "must list at least one extension",
            )));
        }
        for (i, ext) in self.audio_extensions.iter().enumerate() {
            results.push(Validator::not_empty(
                ext.trim_start_matches('.'),
                &format!("conversion.audio_extensions[{}]", i),
            ));
        }

        if let Some(ref filter) = self.match_filter {
            results.push(Validator::not_empty(filter, "conversion.match_filter"));
        }

        let chapter_bounds: Vec<&str> = self.max_chapter_length.split(',').collect();
        if chapter_bounds.is_empty()
            || chapter_bounds.len() > 2
            || chapter_bounds
                .iter()
                .any(|part| part.trim().parse::<u32>().is_err())
        {
            results.push(Err(ValidationError::with_value(
                "conversion.max_chapter_length",
                "must be '<max>' or '<min>,<max>' in seconds",
                &self.max_chapter_length,
            )));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.audio_extensions = other.audio_extensions;
        self.flatten_multi_disc_books = other.flatten_multi_disc_books;
        self.convert_series = other.convert_series;
        self.match_filter = other.match_filter;
        self.overwrite_mode = other.overwrite_mode;
        self.on_complete = other.on_complete;
        self.backup = other.backup;
        self.cpu_cores = other.cpu_cores;
        self.max_chapter_length = other.max_chapter_length;
        self.use_filenames_as_chapters = other.use_filenames_as_chapters;
        self.m4b_tool = other.m4b_tool;
        self.failed_books_var = other.failed_books_var;
    }

    fn section_name(&self) -> &'static str {
        "conversion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ConversionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_extension_list() {
        let mut config = ConversionConfig::default();
        config.audio_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_normalized_extensions() {
        let mut config = ConversionConfig::default();
        config.audio_extensions = vec![".MP3".to_string(), " m4a ".to_string(), "".to_string()];
        assert_eq!(config.normalized_extensions(), vec!["mp3", "m4a"]);
    }

    #[test]
    fn test_bad_chapter_length() {
        let mut config = ConversionConfig::default();
        config.max_chapter_length = "fifteen".to_string();
        assert!(config.validate().is_err());

        config.max_chapter_length = "300".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_match_filter_rejected() {
        let mut config = ConversionConfig::default();
        config.match_filter = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overwrite_mode_parsing() {
        assert_eq!("skip".parse::<OverwriteMode>(), Ok(OverwriteMode::Skip));
        assert_eq!("Y".parse::<OverwriteMode>(), Ok(OverwriteMode::Overwrite));
        assert_eq!(
            "overwrite_silent".parse::<OverwriteMode>(),
            Ok(OverwriteMode::OverwriteSilent)
        );
        assert!("maybe".parse::<OverwriteMode>().is_err());
    }

    #[test]
    fn test_on_complete_parsing() {
        assert_eq!("archive".parse::<OnComplete>(), Ok(OnComplete::Archive));
        assert_eq!("DELETE".parse::<OnComplete>(), Ok(OnComplete::Delete));
        assert_eq!(
            "test_do_nothing".parse::<OnComplete>(),
            Ok(OnComplete::TestDoNothing)
        );
        assert_eq!(OnComplete::TestDoNothing.to_string(), "test-do-nothing");
    }
}

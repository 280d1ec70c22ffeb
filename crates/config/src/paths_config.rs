//! Directory layout configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where books come from, where results go, and where scratch space lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Watched input directory
    pub inbox_dir: PathBuf,

    /// Finished M4B files are filed here
    pub converted_dir: PathBuf,

    /// Originals are moved here after a successful conversion
    pub archive_dir: PathBuf,

    /// Copies of originals taken before conversion
    pub backup_dir: PathBuf,

    /// Parent of the merge/build/trash scratch directories
    pub working_dir: PathBuf,
}

impl PathsConfig {
    /// Staging copy of the book being converted
    pub fn merge_dir(&self) -> PathBuf {
        self.working_dir.join("merge")
    }

    /// Converter output before it is filed
    pub fn build_dir(&self) -> PathBuf {
        self.working_dir.join("build")
    }

    /// Leftovers awaiting deletion
    pub fn trash_dir(&self) -> PathBuf {
        self.working_dir.join("trash")
    }

    /// Directories the process must be able to write to
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.converted_dir.clone(),
            self.archive_dir.clone(),
            self.backup_dir.clone(),
            self.working_dir.clone(),
        ]
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            inbox_dir: PathBuf::from("inbox"),
            converted_dir: PathBuf::from("converted"),
            archive_dir: PathBuf::from("archive"),
            backup_dir: PathBuf::from("backup"),
            working_dir: PathBuf::from("working"),
        }
    }
}

impl ConfigSection for PathsConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::path_set(&self.inbox_dir, "paths.inbox_dir"),
            Validator::path_set(&self.converted_dir, "paths.converted_dir"),
            Validator::path_set(&self.archive_dir, "paths.archive_dir"),
            Validator::path_set(&self.backup_dir, "paths.backup_dir"),
            Validator::path_set(&self.working_dir, "paths.working_dir"),
        ];

        // Outputs live outside the inbox
        for (path, field) in [
            (&self.converted_dir, "paths.converted_dir"),
            (&self.archive_dir, "paths.archive_dir"),
            (&self.backup_dir, "paths.backup_dir"),
            (&self.working_dir, "paths.working_dir"),
        ] {
            results.push(Validator::distinct_paths(
                path,
                &self.inbox_dir,
                field,
                "paths.inbox_dir",
            ));
            if path.starts_with(&self.inbox_dir) && path != &self.inbox_dir {
                results.push(Err(ValidationError::with_value(
                    field,
                    "must not be inside paths.inbox_dir",
                    path.display(),
                )));
            }
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.inbox_dir = other.inbox_dir;
        self.converted_dir = other.converted_dir;
        self.archive_dir = other.archive_dir;
        self.backup_dir = other.backup_dir;
        self.working_dir = other.working_dir;
    }

    fn section_name(&self) -> &'static str {
        "paths"
    }
}

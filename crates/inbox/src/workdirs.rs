//! Scratch space used while converting
//!
//! Nothing in here survives a cycle. A crash mid-conversion leaves stale
//! directories that the next startup wipes.

use crate::error::{InboxError, Result};
use autom4b_config::PathsConfig;
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkingDirs {
    merge: PathBuf,
    build: PathBuf,
    trash: PathBuf,
}

impl WorkingDirs {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            merge: working_dir.join("merge"),
            build: working_dir.join("build"),
            trash: working_dir.join("trash"),
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self {
            merge: paths.merge_dir(),
            build: paths.build_dir(),
            trash: paths.trash_dir(),
        }
    }

    /// Staging copy of the book being converted
    pub fn merge(&self) -> &Path {
        &self.merge
    }

    /// Converter output before it is filed
    pub fn build(&self) -> &Path {
        &self.build
    }

    pub fn trash(&self) -> &Path {
        &self.trash
    }

    fn all(&self) -> [&Path; 3] {
        [&self.merge, &self.build, &self.trash]
    }

    /// Creates any missing scratch directory
    pub fn ensure(&self) -> Result<()> {
        for dir in self.all() {
            fs::create_dir_all(dir).map_err(|e| unwritable(dir, e))?;
        }
        Ok(())
    }

    /// Wipes and recreates every scratch directory
    pub fn clean(&self) -> Result<()> {
        for dir in self.all() {
            match fs::remove_dir_all(dir) {
                Ok(()) => debug!("Cleaned {}", dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(unwritable(dir, e)),
            }
        }
        self.ensure()
    }
}

fn unwritable(path: &Path, source: io::Error) -> InboxError {
    InboxError::OutputUnwritable {
        path: path.to_path_buf(),
        source,
    }
}

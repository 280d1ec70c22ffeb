//! Converting one accepted book
//!
//! Runs entirely on a blocking thread: back up the source, stage a working
//! copy, run the converter, file the output and apply the on-complete
//! action. Any failure leaves the source in the inbox untouched.

use crate::converter::{classify_output, ConversionJob, Converter};
use crate::error::{InboxError, Result};
use crate::flatten::{copy_dir, move_path};
use crate::metadata::probe_book_metadata;
use crate::probe::{self, AudioExtensions};
use crate::workdirs::WorkingDirs;
use autom4b_config::{ConversionConfig, OnComplete, OverwriteMode, PathsConfig};
use autom4b_core::BookKey;
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What happened to a book handed to [`BookConversion::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// A new `.m4b` was filed at this path
    Converted(PathBuf),
    /// The output already existed and the overwrite mode is `skip`
    AlreadyConverted(PathBuf),
}

impl ConversionOutcome {
    pub fn output(&self) -> &Path {
        match self {
            Self::Converted(path) | Self::AlreadyConverted(path) => path,
        }
    }
}

/// Everything needed to convert one book, owned so it can move to a
/// blocking thread
pub struct BookConversion {
    pub key: BookKey,
    /// The book's folder in the inbox
    pub source: PathBuf,
    /// Audio size recorded by the last refresh, checked against the backup
    pub expected_size: u64,
    pub extensions: AudioExtensions,
    pub conversion: ConversionConfig,
    pub paths: PathsConfig,
    pub workdirs: WorkingDirs,
    pub converter: Arc<dyn Converter>,
}

impl BookConversion {
    /// `converted/<key>/<name>.m4b`
    pub fn output_file(&self) -> PathBuf {
        self.key
            .to_path(&self.paths.converted_dir)
            .join(format!("{}.m4b", self.key.name()))
    }

    pub fn run(&self) -> Result<ConversionOutcome> {
        let output = self.output_file();
        if output.exists() {
            match self.conversion.overwrite_mode {
                OverwriteMode::Skip => {
                    info!(
                        "{} is already converted at {}, skipping",
                        self.key,
                        output.display()
                    );
                    return Ok(ConversionOutcome::AlreadyConverted(output));
                }
                OverwriteMode::Overwrite => {
                    warn!("{} will overwrite {}", self.key, output.display())
                }
                OverwriteMode::OverwriteSilent => {
                    debug!("{} will overwrite {}", self.key, output.display())
                }
            }
        }

        if self.conversion.backup {
            self.backup()?;
        }

        let staging = self.key.to_path(self.workdirs.merge());
        replace_dir(&staging)?;
        copy_dir(&self.source, &staging)?;

        let built = self
            .key
            .to_path(self.workdirs.build())
            .join(format!("{}.m4b", self.key.name()));
        if let Some(parent) = built.parent() {
            replace_dir(parent)?;
        }

        let job = ConversionJob {
            key: self.key.clone(),
            metadata: probe_book_metadata(&staging, &self.extensions),
            source_dir: staging.clone(),
            output_file: built.clone(),
            cpu_cores: self.conversion.cpu_cores,
            max_chapter_length: self.conversion.max_chapter_length.clone(),
            use_filenames_as_chapters: self.conversion.use_filenames_as_chapters,
        };
        info!("Converting {} ({})", self.key, job.metadata.title);

        let result = self.converter.convert(&job)?;
        classify_output(&result).map_err(|reason| InboxError::conversion_failed(&self.key, reason))?;
        if !built.is_file() {
            return Err(InboxError::conversion_failed(
                &self.key,
                format!("converter reported success but {} is missing", built.display()),
            ));
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        if output.exists() {
            fs::remove_file(&output)?;
        }
        move_path(&built, &output)?;
        info!("Converted {} -> {}", self.key, output.display());

        self.complete()?;
        remove_if_present(&staging)?;
        Ok(ConversionOutcome::Converted(output))
    }

    /// Copies the source into the backup folder and verifies its size
    fn backup(&self) -> Result<()> {
        let target = self.key.to_path(&self.paths.backup_dir);
        remove_if_present(&target)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_dir(&self.source, &target)?;

        let copied = probe::audio_size(&target, &self.extensions);
        if copied != self.expected_size {
            return Err(InboxError::conversion_failed(
                &self.key,
                format!(
                    "backup size mismatch: expected {} bytes, copied {}",
                    self.expected_size, copied
                ),
            ));
        }
        debug!("Backed up {} to {}", self.key, target.display());
        Ok(())
    }

    fn complete(&self) -> Result<()> {
        match self.conversion.on_complete {
            OnComplete::Archive => {
                let target = self.key.to_path(&self.paths.archive_dir);
                remove_if_present(&target)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                move_path(&self.source, &target)?;
                info!("Archived {} to {}", self.key, target.display());
            }
            OnComplete::Delete => {
                fs::remove_dir_all(&self.source)?;
                info!("Deleted {} from the inbox", self.key);
            }
            OnComplete::TestDoNothing => {
                debug!("Leaving {} in the inbox", self.key);
            }
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn replace_dir(path: &Path) -> io::Result<()> {
    remove_if_present(path)?;
    fs::create_dir_all(path)
}

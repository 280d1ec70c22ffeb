//! Physical remediation: flattening nested books and wrapping loose files

use crate::error::{InboxError, Result};
use autom4b_core::BookKey;
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Moves a file or directory, falling back to copy and delete across devices
pub fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            if from.is_dir() {
                copy_dir(from, to)?;
                fs::remove_dir_all(from)
            } else {
                fs::copy(from, to)?;
                fs::remove_file(from)
            }
        }
        Err(e) => Err(e),
    }
}

/// Recursively copies `from` into a new directory `to`
pub fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Moves every file below `dir`'s subdirectories into `dir` and removes the
/// emptied subdirectories
///
/// Name collisions are detected before anything is moved. Returns the number
/// of files moved.
pub fn flatten_book(key: &BookKey, dir: &Path) -> Result<usize> {
    let mut moves: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut targets: HashMap<PathBuf, PathBuf> = HashMap::new();

    for entry in WalkDir::new(dir).min_depth(2).sort_by_file_name() {
        let entry = entry.map_err(|e| InboxError::FlattenFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let target = dir.join(entry.file_name());
        if target.exists() {
            return Err(InboxError::FlattenFailed {
                key: key.clone(),
                reason: format!("{} already exists in the book folder", target.display()),
            });
        }
        if let Some(previous) = targets.insert(target.clone(), entry.path().to_path_buf()) {
            return Err(InboxError::FlattenFailed {
                key: key.clone(),
                reason: format!(
                    "{} and {} have the same name",
                    previous.display(),
                    entry.path().display()
                ),
            });
        }
        moves.push((entry.path().to_path_buf(), target));
    }

    for (from, to) in &moves {
        debug!("Flattening {} -> {}", from.display(), to.display());
        fs::rename(from, to).map_err(|e| InboxError::FlattenFailed {
            key: key.clone(),
            reason: format!("could not move {}: {}", from.display(), e),
        })?;
    }

    remove_empty_dirs(dir)?;
    info!("Flattened {} ({} files)", key, moves.len());
    Ok(moves.len())
}

/// Removes empty directories below `dir`, deepest first
fn remove_empty_dirs(dir: &Path) -> Result<()> {
    let dirs: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect();

    for sub in dirs {
        if fs::read_dir(&sub)?.next().is_none() {
            fs::remove_dir(&sub)?;
        }
    }
    Ok(())
}

/// Moves a loose audio file into a new folder named after its stem
///
/// Returns the folder path.
pub fn wrap_standalone_file(file: &Path) -> Result<PathBuf> {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no usable file name", file.display()),
            )
        })?;
    let parent = file.parent().unwrap_or_else(|| Path::new("."));
    let folder = parent.join(&stem);

    if folder.exists() && !folder.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a folder", folder.display()),
        )
        .into());
    }

    let file_name = file.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let target = folder.join(file_name);
    if target.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", target.display()),
        )
        .into());
    }

    fs::create_dir_all(&folder)?;
    fs::rename(file, &target)?;
    info!("Moved standalone file {} into {}", file.display(), folder.display());
    Ok(folder)
}

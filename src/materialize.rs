// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Copy located content to its destination.
//!
//! Destinations are created on demand, including every missing parent
//! directory. Nothing here aborts the fleet: every failure is logged and
//! handed back to the caller, which records it as the repository's outcome.

use ignore::WalkBuilder;
use std::{
    fs::copy,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Copy a single file, creating parent directories of destination.
///
/// Returns number of bytes copied.
///
/// # Errors
///
/// - Return [`MaterializeError::SourceMissing`] if source does not exist.
/// - Return [`MaterializeError::CreateDir`] if parents cannot be created.
/// - Return [`MaterializeError::Copy`] if copying fails.
#[instrument(level = "debug")]
pub fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    info!("copy {:?} to {:?}", source.display(), destination.display());
    ensure_source(source)?;
    if let Some(parent) = destination.parent() {
        create_dirs(parent)?;
    }

    copy(source, destination).map_err(|err| {
        warn!("failed to copy {:?}: {err}", source.display());
        MaterializeError::Copy {
            source: err,
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
        }
    })
}

/// Copy a directory tree into destination directory.
///
/// The contents of source are merged into destination, overwriting files of
/// the same name. Returns number of files copied.
///
/// # Errors
///
/// - Return [`MaterializeError::SourceMissing`] if source does not exist.
/// - Return [`MaterializeError::CreateDir`] if a directory cannot be created.
/// - Return [`MaterializeError::Copy`] if copying a file fails.
/// - Return [`MaterializeError::Walk`] if source tree cannot be read.
#[instrument(level = "debug")]
pub fn copy_directory_tree(source: &Path, destination: &Path) -> Result<usize> {
    info!("copy tree {:?} to {:?}", source.display(), destination.display());
    ensure_source(source)?;
    create_dirs(destination)?;

    let mut copied = 0;
    let walker = WalkBuilder::new(source)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    for entry in walker {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);

        match entry.file_type() {
            Some(kind) if kind.is_dir() => create_dirs(&target)?,
            Some(kind) if kind.is_file() => {
                debug!("copy {:?}", relative.display());
                copy(entry.path(), &target).map_err(|err| {
                    warn!("failed to copy {:?}: {err}", entry.path().display());
                    MaterializeError::Copy {
                        source: err,
                        from: entry.path().to_path_buf(),
                        to: target.clone(),
                    }
                })?;
                copied += 1;
            }
            _ => debug!("skip special file {:?}", entry.path().display()),
        }
    }

    Ok(copied)
}

fn ensure_source(source: &Path) -> Result<()> {
    if !source.exists() {
        warn!("source {:?} does not exist, nothing to copy", source.display());
        return Err(MaterializeError::SourceMissing {
            path: source.to_path_buf(),
        });
    }

    Ok(())
}

fn create_dirs(path: &Path) -> Result<()> {
    mkdirp::mkdirp(path).map_err(|err| {
        warn!("failed to create {:?}: {err}", path.display());
        MaterializeError::CreateDir {
            source: err,
            path: path.to_path_buf(),
        }
    })?;

    Ok(())
}

/// Materialization error types.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// Located content vanished before it could be copied.
    #[error("source {:?} does not exist", path.display())]
    SourceMissing { path: PathBuf },

    /// Destination directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be copied.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Source tree cannot be walked.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = MaterializeError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Fleet discovery.
//!
//! A __fleet__ is the set of Git repositories sitting directly below one root
//! directory. Tagsnag only evaluates the top-level of the root, so nested
//! repositories are never part of a fleet.
//!
//! Discovery is a filter, not a validation. Any immediate subdirectory that
//! libgit2 cannot open as a non-bare repository is quietly left out.
//!
//! Repository names double as destination names during extraction, so two
//! repositories whose names only differ by case would write to the same place
//! on case-insensitive file systems. The first one enumerated is kept, and
//! later ones are excluded with a warning.

use crate::repo::Repo;

use std::{
    collections::HashSet,
    fs::read_dir,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Ordered set of repositories discovered under one root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fleet {
    root: PathBuf,
    repos: Vec<Repo>,
}

impl Fleet {
    /// Construct fleet from already opened repositories.
    ///
    /// Repositories whose name collides with an earlier one are dropped.
    pub fn new(root: impl Into<PathBuf>, repos: impl IntoIterator<Item = Repo>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for repo in repos {
            if !seen.insert(repo.name().to_lowercase()) {
                warn!(
                    "exclude {:?}, repository name {:?} already taken",
                    repo.root().display(),
                    repo.name()
                );
                continue;
            }
            unique.push(repo);
        }

        Self {
            root: root.into(),
            repos: unique,
        }
    }

    /// Discover repositories directly below root path.
    ///
    /// Produces repositories in file system enumeration order.
    ///
    /// # Errors
    ///
    /// - Return [`FleetError::ReadRoot`] if root cannot be listed.
    #[instrument(skip(root), level = "debug")]
    pub fn discover(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        info!("discover repositories in {:?}", root.display());
        let entries = read_dir(root).map_err(|err| FleetError::ReadRoot {
            source: err,
            root: root.to_path_buf(),
        })?;

        let mut repos = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            match Repo::open(&path) {
                Ok(repo) => {
                    debug!("found repository {:?}", repo.name());
                    repos.push(repo);
                }
                Err(err) => debug!("skip {:?}: {err}", path.display()),
            }
        }

        Ok(Self::new(root, repos))
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn repos(&self) -> &[Repo] {
        self.repos.as_slice()
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Find repository by display name.
    pub fn find_by_name(&self, name: &str) -> Option<&Repo> {
        self.repos.iter().find(|repo| repo.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Repo> {
        self.repos.iter()
    }
}

impl IntoIterator for Fleet {
    type Item = Repo;
    type IntoIter = std::vec::IntoIter<Repo>;

    fn into_iter(self) -> Self::IntoIter {
        self.repos.into_iter()
    }
}

/// Cache of the fleet for the current root path.
///
/// The fleet is rebuilt whenever a different root is requested, or after an
/// explicit invalidation.
#[derive(Debug, Default)]
pub struct Registry {
    fleet: Option<Fleet>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get fleet for root, discovering it if needed.
    ///
    /// # Errors
    ///
    /// - Return [`FleetError::ReadRoot`] if root cannot be listed.
    pub fn fleet(&mut self, root: impl AsRef<Path>) -> Result<&Fleet> {
        let root = root.as_ref();
        let fleet = match self.fleet.take() {
            Some(fleet) if fleet.root() == root => fleet,
            _ => Fleet::discover(root)?,
        };

        Ok(self.fleet.insert(fleet))
    }

    /// Forget cached fleet.
    pub fn invalidate(&mut self) {
        self.fleet = None;
    }
}

/// Fleet discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// Root directory cannot be listed.
    #[error("failed to read fleet root {:?}", root.display())]
    ReadRoot {
        #[source]
        source: std::io::Error,
        root: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = FleetError> = std::result::Result<T, E>;

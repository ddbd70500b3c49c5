// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snag document layout.
//!
//! A __snag document__ lists repositories by remote URL, and for each of them
//! one or more snags to extract. The document is TOML:
//!
//! ```toml
//! [[repository]]
//! url = "https://git.example.com/group/alpha.git"
//!
//! [[repository.snag]]
//! tag = "2.0"
//! folder = "configs"
//! filename = "config"
//! extension = "json"
//! destination = "$HOME/out"
//!
//! [[repository.snag]]
//! tag = "2.0"
//! directory = "docs"
//! destination = "~/out"
//! ```
//!
//! Repositories are expected next to the document, in a directory named after
//! the last segment of their URL cut at its first dot, e.g., "alpha" for the
//! URL above. Destinations are shell expanded.
//!
//! A document is all or nothing. Any missing field, or any snag that names
//! neither a file nor a directory, rejects the whole document.

use crate::snag::Snag;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Snag document layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SnagDocument {
    /// Repositories to extract from.
    #[serde(rename = "repository", default)]
    pub repositories: Vec<RepositoryEntry>,
}

impl SnagDocument {
    /// Read snag document from file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not a valid document.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Turn document into snags.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::RepoName`] if a URL has no usable name.
    /// - Return [`ConfigError::NoTarget`] if a snag names neither a file nor a
    ///   directory.
    /// - Return [`ConfigError::TwoTargets`] if a snag names both.
    /// - Return [`ConfigError::ShellExpansion`] if a destination cannot be
    ///   expanded.
    pub fn snags(&self) -> Result<Vec<Snag>> {
        let mut snags = Vec::new();
        for repository in &self.repositories {
            let repo = repo_name_from_url(&repository.url)?;
            for (index, entry) in repository.snags.iter().enumerate() {
                snags.push(entry.to_snag(&repository.url, &repo, index)?);
            }
        }

        Ok(snags)
    }
}

impl FromStr for SnagDocument {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for SnagDocument {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Repository entry of snag document.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryEntry {
    /// Remote URL to clone repository from.
    pub url: String,

    /// Extraction requests for this repository.
    #[serde(rename = "snag", default)]
    pub snags: Vec<SnagEntry>,
}

/// Snag entry of snag document.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SnagEntry {
    /// Keyword to resolve to a tag.
    pub tag: String,

    /// Sub-folder of destination to place extracted content in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// Fragment of file name to look for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Extension of file to look for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    /// Fragment of directory path to look for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    /// Destination root, shell expanded.
    pub destination: String,
}

impl SnagEntry {
    fn to_snag(&self, url: &str, repo: &str, index: usize) -> Result<Snag> {
        // INVARIANT: Perform shell expansion on destination field.
        let mut root = PathBuf::from(
            shellexpand::full(self.destination.as_str())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );
        if let Some(folder) = &self.folder {
            root.push(folder);
        }

        let snag = match (&self.filename, &self.extension, &self.directory) {
            (Some(name), Some(extension), None) => {
                Snag::file(repo, &self.tag, name, extension, &root)
            }
            (None, None, Some(name)) => Snag::directory(repo, &self.tag, name, &root),
            (_, _, Some(_)) => {
                return Err(ConfigError::TwoTargets {
                    repo: repo.to_owned(),
                    index,
                })
            }
            _ => {
                return Err(ConfigError::NoTarget {
                    repo: repo.to_owned(),
                    index,
                })
            }
        };

        Ok(snag.with_url(url))
    }
}

/// Derive local repository name from remote URL.
///
/// Takes the last path segment, and cuts it at its first dot.
///
/// # Errors
///
/// - Return [`ConfigError::RepoName`] if no name remains.
pub fn repo_name_from_url(url: &str) -> Result<String> {
    let name = url
        .trim_end_matches('/')
        .rsplit(['/', ':', '\\'])
        .next()
        .and_then(|segment| segment.split('.').next())
        .unwrap_or_default();

    if name.is_empty() {
        return Err(ConfigError::RepoName { url: url.to_owned() });
    }

    Ok(name.to_owned())
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read snag document.
    #[error("failed to read snag document {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Repository URL has no name to use locally.
    #[error("cannot derive repository name from {url:?}")]
    RepoName { url: String },

    /// Snag names neither a file nor a directory.
    #[error("snag {index} of {repo:?} needs filename and extension, or directory")]
    NoTarget { repo: String, index: usize },

    /// Snag names a file and a directory at once.
    #[error("snag {index} of {repo:?} names both a file and a directory")]
    TwoTargets { repo: String, index: usize },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Extraction requests.
//!
//! A __snag__ is one unit of extraction intent: take the repository named
//! `repo`, check out the tag best matching `tag`, find a file or directory
//! in it, and copy that to `destination`. Snags are plain values. They are
//! built once, from a snag document or from command line arguments, and
//! consumed once by the dispatcher.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// What to look for in a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Regular file whose name contains `name`, and ends with `extension`.
    File { name: String, extension: String },

    /// Directory whose path contains `name`.
    Directory { name: String },
}

impl Display for Target {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File { name, extension } => write!(fmt, "file *{name}*{extension}"),
            Self::Directory { name } => write!(fmt, "directory *{name}*"),
        }
    }
}

/// One extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snag {
    /// Remote to clone repository from if it is missing.
    pub url: Option<String>,

    /// Name of target repository.
    pub repo: String,

    /// Keyword to resolve to a tag.
    pub tag: String,

    pub target: Target,

    /// Final path that located content is copied to.
    pub destination: PathBuf,
}

impl Snag {
    /// Request a file to be copied to `<root>/<repo>.<extension>`.
    pub fn file(
        repo: impl Into<String>,
        tag: impl Into<String>,
        name: impl Into<String>,
        extension: impl Into<String>,
        root: impl AsRef<Path>,
    ) -> Self {
        let repo = repo.into();
        let extension = extension.into();
        let destination = file_destination(root.as_ref(), &repo, &extension);

        Self {
            url: None,
            repo,
            tag: tag.into(),
            target: Target::File {
                name: name.into(),
                extension,
            },
            destination,
        }
    }

    /// Request a directory tree to be copied to `<root>/<repo>/`.
    pub fn directory(
        repo: impl Into<String>,
        tag: impl Into<String>,
        name: impl Into<String>,
        root: impl AsRef<Path>,
    ) -> Self {
        let repo = repo.into();
        let destination = directory_destination(root.as_ref(), &repo);

        Self {
            url: None,
            repo,
            tag: tag.into(),
            target: Target::Directory { name: name.into() },
            destination,
        }
    }

    /// Attach remote URL to clone from.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl Display for Snag {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} of {} at <{}> to {:?}",
            self.target,
            self.repo,
            self.tag,
            self.destination.display()
        )
    }
}

/// Destination of a file extracted from a repository.
///
/// A leading dot of the extension is dropped, so "json" and ".json" name the
/// same destination.
pub fn file_destination(root: &Path, repo: &str, extension: &str) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        return root.join(repo);
    }

    root.join(format!("{repo}.{extension}"))
}

/// Destination of a directory extracted from a repository.
pub fn directory_destination(root: &Path, repo: &str) -> PathBuf {
    root.join(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("json", "/out/alpha.json"; "bare extension")]
    #[test_case(".json", "/out/alpha.json"; "dotted extension")]
    #[test_case("", "/out/alpha"; "no extension")]
    #[test]
    fn file_destination_naming(extension: &str, expect: &str) {
        assert_eq!(
            file_destination(Path::new("/out"), "alpha", extension),
            PathBuf::from(expect)
        );
    }

    #[test]
    fn build_snags() {
        let file = Snag::file("alpha", "2.0", "config", "json", "/out")
            .with_url("https://git.example.com/alpha.git");
        assert_eq!(file.destination, PathBuf::from("/out/alpha.json"));
        assert_eq!(file.url.as_deref(), Some("https://git.example.com/alpha.git"));
        assert_eq!(
            file.target,
            Target::File {
                name: "config".into(),
                extension: "json".into()
            }
        );

        let directory = Snag::directory("beta", "2.0", "docs", "/out");
        assert_eq!(directory.destination, PathBuf::from("/out/beta"));
        assert_eq!(directory.url, None);
    }
}

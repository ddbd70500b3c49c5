// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Locate files and directories in a working tree.
//!
//! Searches walk the working tree depth-first, visiting entries of each
//! directory sorted by file name, and never descend into the `.git`
//! directory. Matching is case-insensitive.
//!
//! A search is a description, not a result. Each call to `iter` walks the
//! tree again, lazily, so a search can be restarted after a checkout has
//! changed the working tree underneath it. Callers that only care about the
//! first hit stop the walk right there.

use ignore::{DirEntry, Walk, WalkBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const METADATA_DIR: &str = ".git";

/// Search for regular files by name fragment and extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSearch {
    root: PathBuf,
    name: String,
    extension: String,
}

impl FileSearch {
    /// Construct new file search.
    ///
    /// A file matches if its name ends with `extension` and contains `name`.
    pub fn new(root: impl Into<PathBuf>, name: impl AsRef<str>, extension: impl AsRef<str>) -> Self {
        Self {
            root: root.into(),
            name: name.as_ref().to_lowercase(),
            extension: extension.as_ref().to_lowercase(),
        }
    }

    /// Walk working tree yielding matching files in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = PathBuf> + '_ {
        entries(&self.root)
            .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
            .filter(|entry| {
                let file_name = entry.file_name().to_string_lossy().to_lowercase();
                file_name.ends_with(self.extension.as_str()) && file_name.contains(self.name.as_str())
            })
            .map(|entry| {
                info!("found file {:?}", entry.path().display());
                entry.into_path()
            })
    }

    /// First match in traversal order.
    pub fn first(&self) -> Option<PathBuf> {
        self.iter().next()
    }
}

/// Search for directories by name fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySearch {
    root: PathBuf,
    name: String,
}

impl DirectorySearch {
    /// Construct new directory search.
    ///
    /// A directory matches if its path relative to the search root contains
    /// `name`. The search root itself never matches.
    pub fn new(root: impl Into<PathBuf>, name: impl AsRef<str>) -> Self {
        Self {
            root: root.into(),
            name: name.as_ref().to_lowercase(),
        }
    }

    /// Walk working tree yielding matching directories in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = PathBuf> + '_ {
        entries(&self.root)
            .filter(|entry| entry.depth() > 0)
            .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_dir()))
            .filter(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .map(|relative| {
                        relative
                            .to_string_lossy()
                            .to_lowercase()
                            .contains(self.name.as_str())
                    })
                    .unwrap_or(false)
            })
            .map(|entry| {
                info!("found directory {:?}", entry.path().display());
                entry.into_path()
            })
    }

    /// First match in traversal order.
    pub fn first(&self) -> Option<PathBuf> {
        self.iter().next()
    }
}

fn entries(root: &Path) -> impl Iterator<Item = DirEntry> {
    walker(root).filter_map(|entry| match entry {
        Ok(entry) => Some(entry),
        Err(err) => {
            debug!("skip unreadable entry: {err}");
            None
        }
    })
}

fn walker(root: &Path) -> Walk {
    WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|left, right| left.cmp(right))
        // INVARIANT: Never descend into repository metadata.
        .filter_entry(|entry| entry.file_name() != METADATA_DIR)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for file in files {
            let path = root.path().join(file);
            create_dir_all(path.parent().unwrap()).unwrap();
            write(&path, file.as_bytes()).unwrap();
        }
        root
    }

    fn relative(root: &Path, paths: impl IntoIterator<Item = PathBuf>) -> Vec<String> {
        paths
            .into_iter()
            .map(|path| {
                path.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn file_search_skips_metadata_dir() {
        let root = tree(&[
            ".git/config.json",
            ".git/refs/app_config.json",
            ".github/config.json",
            "src/app_config.json",
            "src/app_config.yaml",
            "README.md",
        ]);

        let search = FileSearch::new(root.path(), "config", "json");
        let result = relative(root.path(), search.iter());
        let expect = vec![".github/config.json", "src/app_config.json"];
        assert_eq!(result, expect);
    }

    #[test]
    fn file_search_ignores_case() {
        let root = tree(&["Deploy/App_CONFIG.JSON", "deploy/readme.txt"]);

        let search = FileSearch::new(root.path(), "config", "json");
        let result = relative(root.path(), search.iter());
        assert_eq!(result, vec!["Deploy/App_CONFIG.JSON"]);
    }

    #[test]
    fn file_search_is_restartable() {
        let root = tree(&["a/config.json"]);
        let search = FileSearch::new(root.path(), "config", "json");
        assert_eq!(search.iter().count(), 1);

        write(root.path().join("b_config.json"), b"{}").unwrap();
        let result = relative(root.path(), search.iter());
        assert_eq!(result, vec!["a/config.json", "b_config.json"]);
    }

    #[test]
    fn file_search_without_match() {
        let root = tree(&["src/main.rs"]);
        let search = FileSearch::new(root.path(), "config", "json");
        assert_eq!(search.first(), None);
    }

    #[test]
    fn directory_search_matches_relative_path() {
        let root = tree(&[
            ".git/docs/HEAD",
            "docs/api/index.md",
            "src/docs_gen/mod.rs",
            "src/lib.rs",
        ]);

        let search = DirectorySearch::new(root.path(), "DOCS");
        let result = relative(root.path(), search.iter());
        let expect = vec!["docs", "docs/api", "src/docs_gen"];
        assert_eq!(result, expect);
        assert_eq!(search.first(), Some(root.path().join("docs")));
    }

    #[test]
    fn directory_search_never_matches_root() {
        let root = tree(&["src/lib.rs"]);
        let name = root.path().file_name().unwrap().to_string_lossy().into_owned();
        let search = DirectorySearch::new(root.path(), name);
        assert_eq!(search.first(), None);
    }
}

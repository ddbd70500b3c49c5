// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository handle.
//!
//! A [`Repo`] is a thin, stateless handle to one Git working tree in the
//! fleet. It holds nothing but the repository's root path and display name.
//! Every query reopens the repository through libgit2 and reads the answer
//! straight from disk, so the on-disk repository remains the only source of
//! truth, and handles can be freely shared between worker threads.
//!
//! # Queries and Mutations
//!
//! Read-only questions, e.g., listing tags, describing HEAD, counting commits
//! ahead or behind a remote, or checking if the working tree is dirty, are
//! answered with libgit2. Anything that changes the repository, e.g., checkout,
//! pull, fetch, stash, or merge, is delegated to the Git binary through
//! [`syscall`]. Failures of those calls keep Git's captured stdout and stderr
//! so the dispatcher can report exactly what went wrong.

pub mod clone;
pub mod dirty;
pub mod syscall;
pub mod tag;

use crate::repo::tag::TagMatch;

use git2::{BranchType, ErrorCode, Repository};
use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Stable identity of a repository: its absolute root path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId(PathBuf);

impl RepoId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }
}

impl Display for RepoId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.0.to_string_lossy().as_ref())
    }
}

/// Target of a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkout {
    /// Local branch, created from a remote-tracking branch if need be.
    Branch(String),

    /// Tag, leaving HEAD detached.
    Tag(String),
}

impl Checkout {
    fn name(&self) -> &str {
        match self {
            Self::Branch(name) | Self::Tag(name) => name.as_str(),
        }
    }

    // INVARIANT: Trailing "--" keeps Git from reading the target as a path.
    fn to_args(&self) -> Vec<OsString> {
        let target = match self {
            Self::Branch(name) => name.clone(),
            Self::Tag(name) => format!("refs/tags/{name}"),
        };

        vec!["checkout".into(), "--quiet".into(), target.into(), "--".into()]
    }
}

/// Reject ref names Git would parse as an option.
fn check_ref_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('-') {
        return Err(RepoError::RefName {
            name: name.to_owned(),
        });
    }

    Ok(())
}

impl Display for Checkout {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Branch(name) => write!(fmt, "branch {name}"),
            Self::Tag(name) => write!(fmt, "tag {name}"),
        }
    }
}

/// Human readable description of where HEAD points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// HEAD commit carries this tag.
    Tag(String),

    /// HEAD is detached at a commit with no tag, given as a 7-char hash.
    Detached(String),

    /// HEAD is on this branch.
    Branch(String),

    /// Repository has no commits yet.
    Unborn,
}

impl Display for HeadState {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Tag(name) | Self::Branch(name) => fmt.write_str(name),
            Self::Detached(hash) => write!(fmt, "detached at {hash}"),
            Self::Unborn => fmt.write_str("no commits yet"),
        }
    }
}

/// Snapshot of a repository's state for status listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSummary {
    pub name: String,
    pub head: HeadState,
    pub branch: Option<String>,
    pub dirty: bool,
    pub tags: usize,
    pub behind: Option<usize>,
    pub ahead: Option<usize>,
}

/// Handle to one repository of the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    root: PathBuf,
    name: String,
}

impl Repo {
    /// Open repository whose working tree is at target path.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Open`] if path is not a Git repository.
    /// - Return [`RepoError::Bare`] if repository has no working tree.
    /// - Return [`RepoError::Nameless`] if working tree path has no base name.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repository = Repository::open(path).map_err(|err| RepoError::Open {
            source: err,
            path: path.to_path_buf(),
        })?;

        let workdir = repository.workdir().ok_or_else(|| RepoError::Bare {
            path: path.to_path_buf(),
        })?;
        let root = workdir.canonicalize().map_err(|err| RepoError::Canonicalize {
            source: err,
            path: workdir.to_path_buf(),
        })?;

        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| RepoError::Nameless { path: root.clone() })?;

        Ok(Self { root, name })
    }

    pub fn id(&self) -> RepoId {
        RepoId::new(self.root.clone())
    }

    /// Display name, i.e., base name of root path.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn repository(&self) -> Result<Repository> {
        Repository::open(&self.root).map_err(|err| RepoError::Open {
            source: err,
            path: self.root.clone(),
        })
    }

    /// List tag names in enumeration order.
    pub fn tags(&self) -> Result<Vec<String>> {
        let repository = self.repository()?;
        let names = repository.tag_names(None)?;

        Ok(names.iter().flatten().map(str::to_owned).collect())
    }

    /// List local branch names.
    pub fn branches(&self) -> Result<Vec<String>> {
        let repository = self.repository()?;
        let mut names = Vec::new();
        for branch in repository.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_owned());
            }
        }

        Ok(names)
    }

    /// List remote names.
    pub fn remotes(&self) -> Result<Vec<String>> {
        let repository = self.repository()?;
        let names = repository.remotes()?;

        Ok(names.iter().flatten().map(str::to_owned).collect())
    }

    /// Check if working tree or index differs from HEAD.
    pub fn is_dirty(&self) -> Result<bool> {
        Ok(dirty::is_dirty(&self.repository()?)?)
    }

    /// Name of checked out branch, or `None` if HEAD is detached.
    pub fn active_branch(&self) -> Result<Option<String>> {
        let repository = self.repository()?;

        // INVARIANT: Check detachment before asking for a branch name.
        if repository.head_detached()? {
            return Ok(None);
        }

        let branch = match repository.head() {
            Ok(head) => head.shorthand().map(str::to_owned),
            Err(err) if err.code() == ErrorCode::UnbornBranch => repository
                .find_reference("HEAD")?
                .symbolic_target()
                .and_then(|target| target.strip_prefix("refs/heads/"))
                .map(str::to_owned),
            Err(err) => return Err(err.into()),
        };

        Ok(branch)
    }

    /// Describe where HEAD points.
    ///
    /// A tag on the HEAD commit is preferred, then a detached description,
    /// then the branch name.
    pub fn head_state(&self) -> Result<HeadState> {
        let repository = self.repository()?;
        let head = match repository.head() {
            Ok(head) => head,
            Err(err) if err.code() == ErrorCode::UnbornBranch => return Ok(HeadState::Unborn),
            Err(err) => return Err(err.into()),
        };
        let commit = head.peel_to_commit()?.id();

        for name in repository.tag_names(None)?.iter().flatten() {
            let tagged = repository
                .revparse_single(format!("refs/tags/{name}").as_str())
                .and_then(|object| object.peel_to_commit());
            if matches!(tagged, Ok(tagged) if tagged.id() == commit) {
                return Ok(HeadState::Tag(name.to_owned()));
            }
        }

        if repository.head_detached()? {
            let hash = commit.to_string();
            return Ok(HeadState::Detached(hash.chars().take(7).collect()));
        }

        Ok(HeadState::Branch(
            head.shorthand().unwrap_or_default().to_owned(),
        ))
    }

    /// Count commits on `remote/branch` that HEAD does not have.
    pub fn behind_count(&self, remote: &str, branch: &str) -> Result<usize> {
        self.ahead_behind(remote, branch).map(|(_, behind)| behind)
    }

    /// Count commits on HEAD that `remote/branch` does not have.
    pub fn ahead_count(&self, remote: &str, branch: &str) -> Result<usize> {
        self.ahead_behind(remote, branch).map(|(ahead, _)| ahead)
    }

    fn ahead_behind(&self, remote: &str, branch: &str) -> Result<(usize, usize)> {
        let repository = self.repository()?;
        let head = repository.head()?.peel_to_commit()?.id();
        let upstream = repository.refname_to_id(format!("refs/remotes/{remote}/{branch}").as_str())?;

        Ok(repository.graph_ahead_behind(head, upstream)?)
    }

    /// Check if `remote/branch` exists as a remote-tracking branch.
    pub fn has_remote_branch(&self, remote: &str, branch: &str) -> Result<bool> {
        let repository = self.repository()?;
        let name = format!("refs/remotes/{remote}/{branch}");
        let found = match repository.find_reference(name.as_str()) {
            Ok(_) => true,
            Err(err) if err.code() == ErrorCode::NotFound => false,
            Err(err) => return Err(err.into()),
        };

        Ok(found)
    }

    /// Resolve keyword to one of this repository's tags.
    #[instrument(skip(self), fields(repo = %self.name), level = "debug")]
    pub fn resolve_tag(&self, keyword: &str) -> Result<Option<TagMatch>> {
        let tags = self.tags()?;
        debug!("tags: {tags:?}");
        let found = tag::resolve(&tags, keyword);
        match &found {
            Some(TagMatch::Exact(name)) => debug!("<{keyword}> matched exactly: {name}"),
            Some(TagMatch::Fuzzy(name)) => debug!("<{keyword}> fuzzy matched: {name}"),
            None => debug!("<{keyword}> matched no tag"),
        }

        Ok(found)
    }

    /// Checkout branch or tag.
    #[instrument(skip(self), fields(repo = %self.name), level = "debug")]
    pub fn checkout(&self, target: &Checkout) -> Result<()> {
        info!("checkout {target}");
        check_ref_name(target.name())?;
        syscall::git(&self.root, target.to_args())?;
        Ok(())
    }

    /// Fast-forward branch from `origin`, and fetch its tags.
    ///
    /// Stale remote-tracking refs and tags are pruned only if `prune` is set.
    #[instrument(skip(self), fields(repo = %self.name), level = "debug")]
    pub fn pull(&self, branch: &str, prune: bool) -> Result<()> {
        info!("pull origin/{branch}");
        check_ref_name(branch)?;
        let mut args: Vec<&str> = vec!["pull", "--ff-only"];
        if prune {
            args.push("--prune");
        }
        args.extend(["origin", branch]);
        let output = syscall::git(&self.root, args)?;
        debug!("{}", output.message());

        self.fetch("origin", prune)
    }

    /// Fetch remote, including its tags.
    #[instrument(skip(self), fields(repo = %self.name), level = "debug")]
    pub fn fetch(&self, remote: &str, prune: bool) -> Result<()> {
        let mut args: Vec<&str> = vec!["fetch", "--tags"];
        if prune {
            args.push("--prune");
        }
        args.push(remote);
        let output = syscall::git(&self.root, args)?;
        debug!("{}", output.message());

        Ok(())
    }

    /// Shelve local changes onto the stash.
    #[instrument(skip(self), fields(repo = %self.name), level = "debug")]
    pub fn stash(&self) -> Result<()> {
        info!("stash local changes");
        syscall::git(&self.root, ["stash"])?;
        Ok(())
    }

    /// Restore most recently stashed changes.
    #[instrument(skip(self), fields(repo = %self.name), level = "debug")]
    pub fn stash_pop(&self) -> Result<()> {
        info!("pop stashed changes");
        syscall::git(&self.root, ["stash", "pop"])?;
        Ok(())
    }

    /// Merge source into checked out branch, refusing anything but a
    /// fast-forward.
    #[instrument(skip(self), fields(repo = %self.name), level = "debug")]
    pub fn merge_fast_forward(&self, source: &str) -> Result<()> {
        info!("fast-forward to {source}");
        syscall::git(&self.root, ["merge", "--ff-only", source])?;
        Ok(())
    }

    /// Gather status information.
    ///
    /// Ahead and behind counts are only given when the active branch has a
    /// counterpart under `origin`.
    pub fn summary(&self) -> Result<RepoSummary> {
        let branch = self.active_branch()?;
        let head = self.head_state()?;
        let (ahead, behind) = match branch.as_deref() {
            Some(name) if head != HeadState::Unborn && self.has_remote_branch("origin", name)? => {
                let (ahead, behind) = self.ahead_behind("origin", name)?;
                (Some(ahead), Some(behind))
            }
            _ => (None, None),
        };

        Ok(RepoSummary {
            name: self.name.clone(),
            head,
            branch,
            dirty: self.is_dirty()?,
            tags: self.tags()?.len(),
            behind,
            ahead,
        })
    }
}

/// Repository handle error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Path is not a valid Git repository.
    #[error("failed to open repository at {:?}", path.display())]
    Open {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Repository has no working tree to check out into.
    #[error("repository at {:?} is bare", path.display())]
    Bare { path: PathBuf },

    /// Working tree path cannot be made absolute.
    #[error("failed to resolve absolute path of {:?}", path.display())]
    Canonicalize {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Working tree path has no base name to display.
    #[error("repository at {:?} has no name", path.display())]
    Nameless { path: PathBuf },

    /// Branch or tag name would be read as a command line option.
    #[error("invalid ref name {name:?}")]
    RefName { name: String },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Git binary call fails.
    #[error(transparent)]
    Syscall(#[from] syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = RepoError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn checkout_args_per_target() {
        assert_eq!(
            Checkout::Branch("master".into()).to_args(),
            vec![
                OsString::from("checkout"),
                "--quiet".into(),
                "master".into(),
                "--".into()
            ]
        );
        assert_eq!(
            Checkout::Tag("2.0".into()).to_args(),
            vec![
                OsString::from("checkout"),
                "--quiet".into(),
                "refs/tags/2.0".into(),
                "--".into()
            ]
        );
    }

    #[test]
    fn reject_option_like_ref_names() {
        assert!(matches!(
            check_ref_name("--orphan"),
            Err(RepoError::RefName { ref name }) if name == "--orphan"
        ));
        assert!(matches!(check_ref_name(""), Err(RepoError::RefName { .. })));
        assert!(check_ref_name("release-2.0").is_ok());
    }

    #[test]
    fn head_state_display() {
        assert_eq!(HeadState::Tag("v1".into()).to_string(), "v1");
        assert_eq!(HeadState::Branch("master".into()).to_string(), "master");
        assert_eq!(
            HeadState::Detached("abc1234".into()).to_string(),
            "detached at abc1234"
        );
        assert_eq!(HeadState::Unborn.to_string(), "no commits yet");
    }

    #[test]
    fn open_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = Repo::open(dir.path());
        assert!(matches!(result, Err(RepoError::Open { .. })));
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dirty working tree policy.
//!
//! Checkouts refuse to run, or worse, silently carry changes along, when a
//! working tree has uncommitted work. Before any task touches a repository it
//! asks this policy whether to go ahead, stash first, or leave the repository
//! alone.

use git2::{DiffOptions, Repository};

/// What a task should do with a repository before checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Working tree is clean.
    Proceed,

    /// Working tree is dirty, and changes must be stashed first.
    ProceedAfterStash,

    /// Working tree is dirty, and must not be touched.
    Skip(String),
}

/// Reason recorded for repositories skipped by the policy.
pub const DIRTY_SKIP_REASON: &str = "dirty, autostash disabled";

/// Decide how to treat a repository given its dirty state.
pub fn decide(dirty: bool, autostash: bool) -> Decision {
    match (dirty, autostash) {
        (false, _) => Decision::Proceed,
        (true, true) => Decision::ProceedAfterStash,
        (true, false) => Decision::Skip(DIRTY_SKIP_REASON.into()),
    }
}

/// Check if repository has uncommitted changes.
///
/// Compares the index against HEAD first. A repository without commits has
/// no HEAD to compare against, so that case, and a clean index, fall back to
/// comparing the working tree against the index. Untracked files do not make
/// a repository dirty.
///
/// # Errors
///
/// - Return [`git2::Error`] if a diff cannot be computed.
pub fn is_dirty(repository: &Repository) -> Result<bool, git2::Error> {
    let head_tree = repository
        .head()
        .ok()
        .and_then(|head| head.peel_to_tree().ok());

    if let Some(tree) = head_tree {
        let staged = repository.diff_tree_to_index(Some(&tree), None, None)?;
        if staged.deltas().len() > 0 {
            return Ok(true);
        }
    }

    let mut opts = DiffOptions::new();
    opts.include_untracked(false);
    let unstaged = repository.diff_index_to_workdir(None, Some(&mut opts))?;

    Ok(unstaged.deltas().len() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case(false, false, Decision::Proceed; "clean without autostash")]
    #[test_case(false, true, Decision::Proceed; "clean with autostash")]
    #[test_case(true, true, Decision::ProceedAfterStash; "dirty with autostash")]
    #[test_case(true, false, Decision::Skip(DIRTY_SKIP_REASON.into()); "dirty without autostash")]
    #[test]
    fn decide_on_dirty_state(dirty: bool, autostash: bool, expect: Decision) {
        assert_eq!(decide(dirty, autostash), expect);
    }
}

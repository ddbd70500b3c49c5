// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-repository outcome tracking.
//!
//! Each fleet operation records one [`Outcome`] per repository in a shared
//! [`StatusTracker`]. Outcomes start as [`Outcome::Pending`] when the fleet
//! call begins, and are written exactly once by the task that owns that
//! repository. Observers, e.g., a progress display or the final summary, may
//! read the tracker at any time; what they see may lag behind the workers,
//! but it is never torn.
//!
//! Alongside outcomes the tracker keeps the most recent [`ProgressEvent`] of
//! each repository, so pollers can render progress without subscribing to
//! anything.

use crate::repo::RepoId;

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};

/// Result of one fleet operation for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Task submitted, but not finished.
    Pending,

    /// Repository was left alone.
    Skipped { reason: String },

    /// Repository was worked on, and something went wrong.
    Failed { reason: String },

    /// Repository was worked on successfully.
    ///
    /// Extraction records the path content was copied to. Other operations
    /// may attach a short note instead.
    Succeeded {
        matched: Option<PathBuf>,
        note: Option<String>,
    },
}

impl Outcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn succeeded() -> Self {
        Self::Succeeded {
            matched: None,
            note: None,
        }
    }

    pub fn matched(path: impl Into<PathBuf>) -> Self {
        Self::Succeeded {
            matched: Some(path.into()),
            note: None,
        }
    }

    pub fn noted(note: impl Into<String>) -> Self {
        Self::Succeeded {
            matched: None,
            note: Some(note.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl Display for Outcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Pending => fmt.write_str("pending"),
            Self::Skipped { reason } => write!(fmt, "skipped: {reason}"),
            Self::Failed { reason } => write!(fmt, "failed: {reason}"),
            Self::Succeeded { matched, note } => {
                fmt.write_str("succeeded")?;
                if let Some(path) = matched {
                    write!(fmt, ": {}", path.display())?;
                }
                if let Some(note) = note {
                    write!(fmt, " ({note})")?;
                }
                Ok(())
            }
        }
    }
}

/// Step a task is currently working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Status,
    Stash,
    Checkout,
    Fetch,
    Pull,
    Resolve,
    Search,
    Copy,
    Clone,
    Done,
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Status => "status",
            Self::Stash => "stash",
            Self::Checkout => "checkout",
            Self::Fetch => "fetch",
            Self::Pull => "pull",
            Self::Resolve => "resolve",
            Self::Search => "search",
            Self::Copy => "copy",
            Self::Clone => "clone",
            Self::Done => "done",
        };
        fmt.write_str(name)
    }
}

/// Progress of one repository's task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: u64,
    pub total: u64,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(phase: Phase, current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            phase,
            current,
            total,
            message: message.into(),
        }
    }
}

/// Receiver of progress events.
///
/// Implementations are called from worker threads, and must not block for
/// long.
pub trait Progress: Send + Sync {
    /// Repository starts being worked on.
    fn start(&self, _repo: &RepoId, _name: &str) {}

    /// Repository advanced to another step.
    fn report(&self, repo: &RepoId, event: &ProgressEvent);

    /// Repository reached a terminal outcome.
    fn finish(&self, _repo: &RepoId, _outcome: &Outcome) {}
}

/// Progress receiver that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _repo: &RepoId, _event: &ProgressEvent) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Record {
    outcome: Outcome,
    progress: Option<ProgressEvent>,
}

/// Thread-safe map from repository to outcome.
///
/// Cloning a tracker yields another handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    records: Arc<RwLock<HashMap<RepoId, Record>>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset tracker, marking given repositories as pending.
    pub fn begin(&self, repos: impl IntoIterator<Item = RepoId>) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.clear();
        for repo in repos {
            records.insert(
                repo,
                Record {
                    outcome: Outcome::Pending,
                    progress: None,
                },
            );
        }
    }

    /// Record outcome of a repository.
    pub fn set(&self, repo: &RepoId, outcome: Outcome) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(repo) {
            Some(record) => record.outcome = outcome,
            None => {
                records.insert(
                    repo.clone(),
                    Record {
                        outcome,
                        progress: None,
                    },
                );
            }
        }
    }

    /// Record latest progress of a repository.
    pub fn set_progress(&self, repo: &RepoId, event: ProgressEvent) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(repo) {
            Some(record) => record.progress = Some(event),
            None => {
                records.insert(
                    repo.clone(),
                    Record {
                        outcome: Outcome::Pending,
                        progress: Some(event),
                    },
                );
            }
        }
    }

    /// Outcome of a repository, if it is part of the current fleet call.
    pub fn status(&self, repo: &RepoId) -> Option<Outcome> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(repo).map(|record| record.outcome.clone())
    }

    /// Latest progress event of a repository.
    pub fn progress(&self, repo: &RepoId) -> Option<ProgressEvent> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(repo).and_then(|record| record.progress.clone())
    }

    /// Snapshot of every outcome.
    pub fn all_statuses(&self) -> HashMap<RepoId, Outcome> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .map(|(repo, record)| (repo.clone(), record.outcome.clone()))
            .collect()
    }

    /// Repositories still pending.
    pub fn pending(&self) -> Vec<RepoId> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .filter(|(_, record)| !record.outcome.is_terminal())
            .map(|(repo, _)| repo.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn begin_marks_repos_pending() {
        let tracker = StatusTracker::new();
        let alpha = RepoId::new("/fleet/alpha");
        let beta = RepoId::new("/fleet/beta");
        tracker.set(&RepoId::new("/old/gamma"), Outcome::succeeded());

        tracker.begin([alpha.clone(), beta.clone()]);

        assert_eq!(tracker.status(&alpha), Some(Outcome::Pending));
        assert_eq!(tracker.status(&RepoId::new("/old/gamma")), None);
        let mut pending = tracker.pending();
        pending.sort();
        assert_eq!(pending, vec![alpha, beta]);
    }

    #[test]
    fn set_keeps_progress() {
        let tracker = StatusTracker::new();
        let alpha = RepoId::new("/fleet/alpha");
        tracker.begin([alpha.clone()]);

        let event = ProgressEvent::new(Phase::Checkout, 2, 4, "checkout tag 2.0");
        tracker.set_progress(&alpha, event.clone());
        tracker.set(&alpha, Outcome::skipped("tag not found"));

        assert_eq!(tracker.progress(&alpha), Some(event));
        assert_eq!(tracker.status(&alpha), Some(Outcome::skipped("tag not found")));
        assert!(tracker.pending().is_empty());
    }

    #[test]
    fn concurrent_writers_each_own_a_key() {
        let tracker = StatusTracker::new();
        let repos = (0..16)
            .map(|idx| RepoId::new(format!("/fleet/repo{idx}")))
            .collect::<Vec<_>>();
        tracker.begin(repos.clone());

        let handles = repos
            .iter()
            .cloned()
            .map(|repo| {
                let tracker = tracker.clone();
                thread::spawn(move || tracker.set(&repo, Outcome::matched(repo.as_path())))
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let statuses = tracker.all_statuses();
        assert_eq!(statuses.len(), 16);
        for repo in repos {
            assert_eq!(statuses[&repo], Outcome::matched(repo.as_path()));
        }
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::Pending.to_string(), "pending");
        assert_eq!(
            Outcome::skipped("tag not found").to_string(),
            "skipped: tag not found"
        );
        assert_eq!(Outcome::failed("boom").to_string(), "failed: boom");
        assert_eq!(
            Outcome::matched("/out/alpha.json").to_string(),
            "succeeded: /out/alpha.json"
        );
        assert_eq!(Outcome::noted("up to date").to_string(), "succeeded (up to date)");
    }
}

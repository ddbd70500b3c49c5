// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Fleet-wide job dispatch.
//!
//! The [`Dispatcher`] fans one fleet operation out over a bounded
//! [`WorkerPool`], with exactly one task per repository. Tasks are
//! independent. A task never waits on another task, and whatever goes wrong
//! inside one, be it a missing tag, a dirty working tree, a failing Git call,
//! or a failed copy, ends up as that repository's [`Outcome`] and nothing
//! more. The fleet call returns once every started task has finished.
//!
//! Within a task, steps run strictly in order, since each step depends on
//! what the previous one left on disk:
//!
//! ```text
//! resolve tag -> dirty policy -> stash -> checkout -> search -> copy
//! ```
//!
//! Updates follow the same shape, with the mainline in place of a tag, and a
//! pull in place of search and copy.
//!
//! # Interrupts
//!
//! Triggering the dispatcher's [`Interrupt`] stops it from starting more
//! tasks. Tasks already running are left to finish. Repositories whose task
//! never started are recorded as skipped.

pub mod pool;

pub use pool::{Interrupt, WorkerPool};

use crate::{
    fleet::Fleet,
    locate::{DirectorySearch, FileSearch},
    materialize::{copy_directory_tree, copy_file, MaterializeError},
    repo::{
        clone::{clone_into, CloneError},
        dirty::{self, Decision},
        Checkout, Repo, RepoError, RepoId,
    },
    snag::{Snag, Target},
    status::{NoProgress, Outcome, Phase, Progress, ProgressEvent, StatusTracker},
};

use indicatif::{MultiProgress, ProgressBar};
use std::{
    cell::Cell,
    collections::{HashMap, HashSet},
    error::Error,
    path::Path,
    sync::Arc,
};
use tracing::{info, instrument, warn};

/// Remote that updates pull from.
pub const ORIGIN: &str = "origin";

/// Branch updates bring up to date unless told otherwise.
pub const DEFAULT_MAINLINE: &str = "master";

pub const TAG_NOT_FOUND: &str = "tag not found";
pub const NO_MATCH: &str = "no match found";
pub const NO_ORIGIN: &str = "no origin remote";
pub const REPO_NOT_FOUND: &str = "repository not found";
pub const INTERRUPTED: &str = "interrupted";
pub const TASK_PANICKED: &str = "task panicked";

/// Settings shared by every task of a fleet call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetOptions {
    /// Stash local changes instead of skipping dirty repositories.
    pub autostash: bool,

    /// Prune stale remote-tracking refs and tags when fetching.
    pub prune: bool,

    /// Branch to bring up to date.
    pub mainline: String,
}

impl Default for FleetOptions {
    fn default() -> Self {
        Self {
            autostash: false,
            prune: false,
            mainline: DEFAULT_MAINLINE.into(),
        }
    }
}

/// Fan fleet operations out across a worker pool.
#[derive(Clone)]
pub struct Dispatcher {
    pool: WorkerPool,
    options: FleetOptions,
    tracker: StatusTracker,
    progress: Arc<dyn Progress>,
    interrupt: Interrupt,
}

impl Dispatcher {
    pub fn new(pool: WorkerPool, options: FleetOptions) -> Self {
        Self {
            pool,
            options,
            tracker: StatusTracker::new(),
            progress: Arc::new(NoProgress),
            interrupt: Interrupt::new(),
        }
    }

    /// Send progress events of every task to given receiver.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Share interrupt flag with the caller, e.g., a signal handler.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Outcome of a repository in the latest fleet call.
    pub fn status(&self, id: &RepoId) -> Option<Outcome> {
        self.tracker.status(id)
    }

    /// Outcome of every repository in the latest fleet call.
    pub fn all_statuses(&self) -> HashMap<RepoId, Outcome> {
        self.tracker.all_statuses()
    }

    /// Bring every repository's mainline up to date with `origin`.
    pub async fn update_all(&self, fleet: &Fleet) -> HashMap<RepoId, Outcome> {
        info!("update {} repositories", fleet.len());
        let options = self.options.clone();
        self.fan_out(repo_jobs(fleet), 4, move |task, repo| {
            task.conclude(update_repo(&repo, &options, task))
        })
        .await
    }

    /// Extract a file from every repository at the tag best matching `tag`.
    ///
    /// The first file whose name contains `name` and ends with `extension`
    /// is copied to `<destination>/<repo>.<extension>`.
    pub async fn extract_file_from_all(
        &self,
        fleet: &Fleet,
        tag: &str,
        name: &str,
        extension: &str,
        destination: &Path,
    ) -> HashMap<RepoId, Outcome> {
        info!("extract file *{name}*{extension} at <{tag}> from {} repositories", fleet.len());
        let jobs = fleet
            .iter()
            .map(|repo| {
                let snag = Snag::file(repo.name(), tag, name, extension, destination);
                (repo.id(), (repo.clone(), snag))
            })
            .collect();
        self.extract_each(jobs).await
    }

    /// Extract a directory tree from every repository at the tag best
    /// matching `tag`.
    ///
    /// The first directory whose path contains `name` is copied into
    /// `<destination>/<repo>/`.
    pub async fn extract_directory_from_all(
        &self,
        fleet: &Fleet,
        tag: &str,
        name: &str,
        destination: &Path,
    ) -> HashMap<RepoId, Outcome> {
        info!("extract directory *{name}* at <{tag}> from {} repositories", fleet.len());
        let jobs = fleet
            .iter()
            .map(|repo| {
                let snag = Snag::directory(repo.name(), tag, name, destination);
                (repo.id(), (repo.clone(), snag))
            })
            .collect();
        self.extract_each(jobs).await
    }

    async fn extract_each(&self, jobs: Vec<(RepoId, (Repo, Snag))>) -> HashMap<RepoId, Outcome> {
        let autostash = self.options.autostash;
        self.fan_out(jobs, 5, move |task, (repo, snag)| {
            task.conclude(extract_snag(&repo, &snag, autostash, task))
        })
        .await
    }

    /// Fetch `origin` of every repository, tags included.
    pub async fn fetch_all(&self, fleet: &Fleet) -> HashMap<RepoId, Outcome> {
        info!("fetch {} repositories", fleet.len());
        let prune = self.options.prune;
        self.fan_out(repo_jobs(fleet), 2, move |task, repo| {
            task.conclude(fetch_repo(&repo, prune, task))
        })
        .await
    }

    /// Run a batch of snags against the fleet.
    ///
    /// Snags are grouped per repository, so one task owns one repository.
    /// Each task applies the dirty policy, brings the mainline up to date,
    /// then works through its snags in order. Snags naming a repository that
    /// is not part of the fleet are recorded as skipped.
    pub async fn run_snags(&self, fleet: &Fleet, snags: Vec<Snag>) -> HashMap<RepoId, Outcome> {
        info!("run {} snags", snags.len());
        let mut groups: Vec<(Repo, Vec<Snag>)> = Vec::new();
        let mut missing: Vec<RepoId> = Vec::new();
        for snag in snags {
            if let Some((_, group)) = groups.iter_mut().find(|(repo, _)| repo.name() == snag.repo) {
                group.push(snag);
                continue;
            }

            match fleet.find_by_name(&snag.repo) {
                Some(repo) => groups.push((repo.clone(), vec![snag])),
                None => {
                    warn!("no repository named {:?} in fleet", snag.repo);
                    let id = RepoId::new(fleet.root().join(&snag.repo));
                    if !missing.contains(&id) {
                        missing.push(id);
                    }
                }
            }
        }

        let jobs = groups
            .into_iter()
            .map(|(repo, group)| (repo.id(), (repo, group)))
            .collect();
        let options = self.options.clone();
        let mut statuses = self
            .fan_out(jobs, 8, move |task, (repo, group)| {
                task.conclude(snag_repo(&repo, &group, &options, task))
            })
            .await;

        for id in missing {
            let outcome = Outcome::skipped(REPO_NOT_FOUND);
            self.tracker.set(&id, outcome.clone());
            statuses.insert(id, outcome);
        }

        statuses
    }

    /// Clone repositories that snags name but that are not on disk yet.
    ///
    /// Each snag's repository is expected at `<root>/<repo>`. Snags without
    /// a URL, or whose repository already exists, are left alone. Transfer
    /// progress is drawn on bars added to `bars`.
    pub async fn clone_missing(
        &self,
        root: &Path,
        snags: &[Snag],
        bars: &MultiProgress,
    ) -> HashMap<RepoId, Outcome> {
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for snag in snags {
            let Some(url) = &snag.url else {
                continue;
            };
            let path = root.join(&snag.repo);
            if path.exists() || !seen.insert(path.clone()) {
                continue;
            }
            jobs.push((RepoId::new(path.clone()), (url.clone(), path)));
        }

        if jobs.is_empty() {
            return HashMap::new();
        }

        info!("clone {} missing repositories", jobs.len());
        let bars = bars.clone();
        self.fan_out(jobs, 2, move |task, (url, path)| {
            let bar = bars.add(ProgressBar::no_length());
            task.conclude(clone_repo(&url, &path, bar, task))
        })
        .await
    }

    async fn fan_out<J, F>(&self, jobs: Vec<(RepoId, J)>, steps: u64, work: F) -> HashMap<RepoId, Outcome>
    where
        J: Send + 'static,
        F: Fn(&Task, J) -> Outcome + Send + Sync + 'static,
    {
        self.tracker.begin(jobs.iter().map(|(id, _)| id.clone()));

        let tracker = self.tracker.clone();
        let progress = Arc::clone(&self.progress);
        let abandoned = self
            .pool
            .run(jobs, &self.interrupt, move |(id, job)| {
                let task = Task::new(id, steps, tracker.clone(), Arc::clone(&progress));
                let outcome = work(&task, job);
                task.finish(outcome);
            })
            .await;

        for (id, _) in abandoned {
            info!("{id} not started, interrupted");
            self.record(&id, Outcome::skipped(INTERRUPTED));
        }

        // INVARIANT: Every repository leaves the fleet call with a terminal outcome.
        for id in self.tracker.pending() {
            warn!("{id} never reported an outcome");
            self.record(&id, Outcome::failed(TASK_PANICKED));
        }

        self.tracker.all_statuses()
    }

    fn record(&self, id: &RepoId, outcome: Outcome) {
        self.progress.finish(id, &outcome);
        self.tracker.set(id, outcome);
    }
}

fn repo_jobs(fleet: &Fleet) -> Vec<(RepoId, Repo)> {
    fleet.iter().map(|repo| (repo.id(), repo.clone())).collect()
}

/// Handle of one running task for progress reporting.
struct Task {
    id: RepoId,
    steps: u64,
    current: Cell<u64>,
    tracker: StatusTracker,
    progress: Arc<dyn Progress>,
}

impl Task {
    fn new(id: RepoId, steps: u64, tracker: StatusTracker, progress: Arc<dyn Progress>) -> Self {
        let name = id
            .as_path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        progress.start(&id, &name);

        Self {
            id,
            steps,
            current: Cell::new(0),
            tracker,
            progress,
        }
    }

    fn step(&self, phase: Phase, message: impl Into<String>) {
        let current = (self.current.get() + 1).min(self.steps);
        self.current.set(current);
        self.emit(ProgressEvent::new(phase, current, self.steps, message));
    }

    fn emit(&self, event: ProgressEvent) {
        self.progress.report(&self.id, &event);
        self.tracker.set_progress(&self.id, event);
    }

    /// Fold a task's result into an outcome.
    fn conclude(&self, result: Result<Outcome>) -> Outcome {
        result.unwrap_or_else(|err| {
            let reason = failure_reason(&err);
            warn!("{}: {reason}", self.id);
            Outcome::failed(reason)
        })
    }

    fn finish(self, outcome: Outcome) {
        self.emit(ProgressEvent::new(Phase::Done, self.steps, self.steps, outcome.to_string()));
        self.progress.finish(&self.id, &outcome);
        self.tracker.set(&self.id, outcome);
    }
}

/// Render an error and all of its causes on one line.
fn failure_reason(err: &dyn Error) -> String {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(cause.to_string().as_str());
        source = cause.source();
    }

    reason
}

/// Apply dirty policy, stashing if need be.
///
/// Returns the outcome to record if the repository must be left alone.
fn apply_dirty_policy(repo: &Repo, autostash: bool, task: &Task) -> Result<Option<Outcome>> {
    task.step(Phase::Status, "check working tree");
    match dirty::decide(repo.is_dirty()?, autostash) {
        Decision::Proceed => Ok(None),
        Decision::ProceedAfterStash => {
            task.step(Phase::Stash, "stash local changes");
            repo.stash()?;
            Ok(None)
        }
        Decision::Skip(reason) => {
            info!("skip {}: {reason}", repo.name());
            Ok(Some(Outcome::skipped(reason)))
        }
    }
}

/// Checkout mainline, and fast-forward it from `origin`.
///
/// Returns a short note describing what happened.
fn bring_up_to_date(repo: &Repo, options: &FleetOptions, task: &Task) -> Result<String> {
    let mainline = options.mainline.as_str();
    let on_mainline = repo.active_branch()?.as_deref() == Some(mainline);
    if !on_mainline {
        task.step(Phase::Checkout, format!("checkout {mainline}"));
        repo.checkout(&Checkout::Branch(mainline.into()))?;
    }

    if !repo.remotes()?.iter().any(|remote| remote == ORIGIN) {
        info!("{} has no {ORIGIN} remote, nothing to pull", repo.name());
        return Ok(format!("on {mainline}, {NO_ORIGIN}"));
    }

    if !on_mainline {
        task.step(Phase::Pull, format!("pull {ORIGIN}/{mainline}"));
        repo.pull(mainline, options.prune)?;
        return Ok(format!("switched to {mainline}, pulled"));
    }

    task.step(Phase::Fetch, format!("fetch {ORIGIN}"));
    repo.fetch(ORIGIN, options.prune)?;
    if !repo.has_remote_branch(ORIGIN, mainline)? {
        return Ok(format!("no {ORIGIN}/{mainline} to pull from"));
    }

    let behind = repo.behind_count(ORIGIN, mainline)?;
    if behind == 0 {
        return Ok("up to date".into());
    }

    task.step(Phase::Pull, format!("fast-forward {behind} commits"));
    repo.merge_fast_forward(format!("{ORIGIN}/{mainline}").as_str())?;

    Ok(format!("fast-forwarded {behind} commits"))
}

#[instrument(skip(repo, options, task), fields(repo = %repo.name()), level = "debug")]
fn update_repo(repo: &Repo, options: &FleetOptions, task: &Task) -> Result<Outcome> {
    if let Some(skipped) = apply_dirty_policy(repo, options.autostash, task)? {
        return Ok(skipped);
    }

    let note = bring_up_to_date(repo, options, task)?;
    info!("{}: {note}", repo.name());

    Ok(Outcome::noted(note))
}

#[instrument(skip(repo, task), fields(repo = %repo.name()), level = "debug")]
fn fetch_repo(repo: &Repo, prune: bool, task: &Task) -> Result<Outcome> {
    if !repo.remotes()?.iter().any(|remote| remote == ORIGIN) {
        return Ok(Outcome::skipped(NO_ORIGIN));
    }

    task.step(Phase::Fetch, format!("fetch {ORIGIN}"));
    repo.fetch(ORIGIN, prune)?;

    let branch = match repo.active_branch()? {
        Some(branch) if repo.has_remote_branch(ORIGIN, &branch)? => branch,
        _ => return Ok(Outcome::noted("fetched")),
    };
    task.step(Phase::Status, format!("compare with {ORIGIN}/{branch}"));
    let behind = repo.behind_count(ORIGIN, &branch)?;

    Ok(Outcome::noted(format!("behind {behind}")))
}

/// Resolve, checkout, locate, and copy one snag.
///
/// Tags are resolved before the dirty policy runs, so repositories without
/// a matching tag are never stashed.
#[instrument(skip(repo, snag, task), fields(repo = %repo.name()), level = "debug")]
fn extract_snag(repo: &Repo, snag: &Snag, autostash: bool, task: &Task) -> Result<Outcome> {
    task.step(Phase::Resolve, format!("resolve <{}>", snag.tag));
    let Some(found) = repo.resolve_tag(&snag.tag)? else {
        info!("skip {}: no tag matches <{}>", repo.name(), snag.tag);
        return Ok(Outcome::skipped(TAG_NOT_FOUND));
    };

    if let Some(skipped) = apply_dirty_policy(repo, autostash, task)? {
        return Ok(skipped);
    }

    task.step(Phase::Checkout, format!("checkout {}", found.name()));
    repo.checkout(&Checkout::Tag(found.name().to_owned()))?;

    task.step(Phase::Search, format!("search {}", snag.target));
    let source = match &snag.target {
        Target::File { name, extension } => FileSearch::new(repo.root(), name, extension).first(),
        Target::Directory { name } => DirectorySearch::new(repo.root(), name).first(),
    };
    let Some(source) = source else {
        info!("skip {}: no {} at {found}", repo.name(), snag.target);
        return Ok(Outcome::skipped(NO_MATCH));
    };

    task.step(Phase::Copy, format!("copy to {}", snag.destination.display()));
    match &snag.target {
        Target::File { .. } => {
            copy_file(&source, &snag.destination)?;
        }
        Target::Directory { .. } => {
            copy_directory_tree(&source, &snag.destination)?;
        }
    }

    Ok(Outcome::matched(snag.destination.clone()))
}

#[instrument(skip(repo, snags, options, task), fields(repo = %repo.name()), level = "debug")]
fn snag_repo(repo: &Repo, snags: &[Snag], options: &FleetOptions, task: &Task) -> Result<Outcome> {
    if let Some(skipped) = apply_dirty_policy(repo, options.autostash, task)? {
        return Ok(skipped);
    }
    bring_up_to_date(repo, options, task)?;

    let outcomes = snags
        .iter()
        .map(|snag| task.conclude(extract_snag(repo, snag, options.autostash, task)))
        .collect();

    Ok(aggregate(outcomes))
}

/// Combine outcomes of several snags on one repository.
///
/// Any failure fails the repository. Otherwise the last success wins, and
/// if nothing succeeded, the first skip reason is kept.
fn aggregate(outcomes: Vec<Outcome>) -> Outcome {
    if let Some(failed) = outcomes.iter().find(|outcome| outcome.is_failed()) {
        return failed.clone();
    }

    if let Some(succeeded) = outcomes.iter().rev().find(|outcome| outcome.is_succeeded()) {
        return succeeded.clone();
    }

    outcomes
        .into_iter()
        .find(Outcome::is_skipped)
        .unwrap_or_else(|| Outcome::skipped(NO_MATCH))
}

#[instrument(skip(bar, task), level = "debug")]
fn clone_repo(url: &str, path: &Path, bar: ProgressBar, task: &Task) -> Result<Outcome> {
    task.step(Phase::Clone, format!("clone {url}"));
    let repo = clone_into(url, path, bar, |event| task.emit(event))?;
    info!("cloned {url} into {:?}", repo.root().display());

    Ok(Outcome::noted(format!("cloned from {url}")))
}

/// Error types of a single task.
#[derive(Debug, thiserror::Error)]
enum TaskError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Clone(#[from] CloneError),
}

/// Friendly result alias :3
type Result<T, E = TaskError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn aggregate_prefers_failure() {
        let result = aggregate(vec![
            Outcome::matched("/out/alpha.json"),
            Outcome::failed("copy failed"),
            Outcome::skipped(TAG_NOT_FOUND),
        ]);
        assert_eq!(result, Outcome::failed("copy failed"));
    }

    #[test]
    fn aggregate_keeps_last_success() {
        let result = aggregate(vec![
            Outcome::matched("/out/alpha.json"),
            Outcome::skipped(TAG_NOT_FOUND),
            Outcome::matched("/out/alpha"),
        ]);
        assert_eq!(result, Outcome::matched("/out/alpha"));
    }

    #[test]
    fn aggregate_keeps_first_skip_reason() {
        let result = aggregate(vec![
            Outcome::skipped(TAG_NOT_FOUND),
            Outcome::skipped(NO_MATCH),
        ]);
        assert_eq!(result, Outcome::skipped(TAG_NOT_FOUND));
        assert_eq!(aggregate(Vec::new()), Outcome::skipped(NO_MATCH));
    }

    #[test]
    fn failure_reason_walks_sources() {
        let err = TaskError::Materialize(MaterializeError::CreateDir {
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            path: PathBuf::from("/out"),
        });
        assert_eq!(
            failure_reason(&err),
            "failed to create directory \"/out\": denied"
        );
    }

    #[test]
    fn default_options() {
        let options = FleetOptions::default();
        assert!(!options.autostash);
        assert!(!options.prune);
        assert_eq!(options.mainline, DEFAULT_MAINLINE);
    }
}

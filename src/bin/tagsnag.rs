// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use tagsnag::{
    config::SnagDocument,
    dispatch::{Dispatcher, FleetOptions, Interrupt, WorkerPool, DEFAULT_MAINLINE},
    fleet::Fleet,
    path::{default_destination, default_logfile},
    repo::{Repo, RepoId},
    status::{Outcome, Progress, ProgressEvent},
};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::{
    collections::HashMap,
    fs::OpenOptions,
    path::PathBuf,
    process::exit,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "tagsnag [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let Cli { global, command } = self;
        match command {
            Command::Update => run_update(global).await,
            Command::File(opts) => run_file(global, opts).await,
            Command::Dir(opts) => run_dir(global, opts).await,
            Command::Snag(opts) => run_snag(global, opts).await,
            Command::Fetch => run_fetch(global).await,
            Command::Status => run_status(global),
            Command::Stash(opts) => run_stash(global, opts),
            Command::Pop(opts) => run_pop(global, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Fast-forward mainline of every repository from origin.
    #[command(override_usage = "tagsnag update [options]")]
    Update,

    /// Extract a file from every repository at matching tag.
    #[command(override_usage = "tagsnag file [options] <tag> <name> <extension>")]
    File(FileOptions),

    /// Extract a directory from every repository at matching tag.
    #[command(override_usage = "tagsnag dir [options] <tag> <name>")]
    Dir(DirOptions),

    /// Run every snag listed in a snag document.
    #[command(override_usage = "tagsnag snag [options] <document>")]
    Snag(SnagOptions),

    /// Fetch origin of every repository.
    #[command(override_usage = "tagsnag fetch [options]")]
    Fetch,

    /// Show status information about every repository.
    #[command(override_usage = "tagsnag status [options]")]
    Status,

    /// Stash local changes of target repositories.
    #[command(override_usage = "tagsnag stash [options] <repo>...")]
    Stash(RepoNames),

    /// Restore stashed changes of target repositories.
    #[command(override_usage = "tagsnag pop [options] <repo>...")]
    Pop(RepoNames),
}

#[derive(Args, Clone, Debug)]
struct GlobalOptions {
    /// Directory containing the fleet of repositories.
    #[arg(short, long, global = true, value_name = "path")]
    pub root: Option<PathBuf>,

    /// Number of repositories to work on at once.
    #[arg(short, long, global = true, value_name = "count")]
    pub jobs: Option<usize>,

    /// Branch to bring up to date.
    #[arg(short, long, global = true, value_name = "branch", default_value = DEFAULT_MAINLINE)]
    pub mainline: String,

    /// Stash local changes instead of skipping dirty repositories.
    #[arg(short, long, global = true)]
    pub autostash: bool,

    /// Prune stale remote-tracking refs and tags when fetching.
    #[arg(short, long, global = true)]
    pub prune: bool,

    /// Log debug information.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append log to a logfile.
    #[arg(short, long, global = true)]
    pub log: bool,

    /// Path to logfile, implies --log.
    #[arg(long, global = true, value_name = "path")]
    pub logfile: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct FileOptions {
    /// Keyword to resolve to a tag.
    #[arg(required = true, value_name = "tag")]
    pub tag: String,

    /// Fragment of file name to look for.
    #[arg(required = true, value_name = "name")]
    pub name: String,

    /// Extension of file to look for.
    #[arg(required = true, value_name = "extension")]
    pub extension: String,

    #[command(flatten)]
    pub extract: ExtractOptions,
}

#[derive(Args, Clone, Debug)]
struct DirOptions {
    /// Keyword to resolve to a tag.
    #[arg(required = true, value_name = "tag")]
    pub tag: String,

    /// Fragment of directory path to look for.
    #[arg(required = true, value_name = "name")]
    pub name: String,

    #[command(flatten)]
    pub extract: ExtractOptions,
}

#[derive(Args, Clone, Debug)]
struct ExtractOptions {
    /// Directory to copy extracted content into.
    #[arg(short, long, value_name = "path")]
    pub destination: Option<PathBuf>,

    /// Update every repository before extracting.
    #[arg(short, long)]
    pub update: bool,
}

#[derive(Args, Clone, Debug)]
struct SnagOptions {
    /// Path to snag document.
    #[arg(required = true, value_name = "document")]
    pub document: PathBuf,
}

#[derive(Args, Clone, Debug)]
struct RepoNames {
    /// Names of repositories to target.
    #[arg(required = true, value_name = "repo")]
    pub names: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(&cli.global) {
        eprintln!("failed to set up logging: {error:?}");
        exit(1);
    }

    if let Err(error) = cli.run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn init_logging(opts: &GlobalOptions) -> Result<()> {
    let level = if opts.verbose { "debug" } else { "info" };
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let logfile = match (&opts.logfile, opts.log) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(default_logfile()?),
        (None, false) => None,
    };
    let file_layer = match logfile {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                mkdirp::mkdirp(parent)
                    .with_context(|| format!("failed to create {:?}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open logfile {:?}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(file_layer)
        .with(filter)
        .init();

    Ok(())
}

fn fleet_root(opts: &GlobalOptions) -> Result<PathBuf> {
    let root = match &opts.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };

    root.canonicalize()
        .with_context(|| format!("failed to resolve fleet root {:?}", root.display()))
}

fn dispatcher(opts: &GlobalOptions, bars: &MultiProgress) -> Dispatcher {
    let pool = match opts.jobs {
        Some(jobs) => WorkerPool::new(jobs),
        None => WorkerPool::with_available_parallelism(),
    };
    let options = FleetOptions {
        autostash: opts.autostash,
        prune: opts.prune,
        mainline: opts.mainline.clone(),
    };

    let interrupt = Interrupt::new();
    let trigger = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, waiting for running tasks to finish");
            trigger.trigger();
        }
    });

    Dispatcher::new(pool, options)
        .with_interrupt(interrupt)
        .with_progress(Arc::new(BarProgress::new(bars.clone())))
}

async fn run_update(opts: GlobalOptions) -> Result<()> {
    let fleet = Fleet::discover(fleet_root(&opts)?)?;
    let bars = MultiProgress::new();
    let statuses = dispatcher(&opts, &bars).update_all(&fleet).await;
    print_summary(&statuses);

    Ok(())
}

async fn run_file(global: GlobalOptions, opts: FileOptions) -> Result<()> {
    let fleet = Fleet::discover(fleet_root(&global)?)?;
    let destination = destination(&opts.extract)?;
    let bars = MultiProgress::new();
    let dispatcher = dispatcher(&global, &bars);

    if opts.extract.update {
        print_summary(&dispatcher.update_all(&fleet).await);
    }

    let statuses = dispatcher
        .extract_file_from_all(&fleet, &opts.tag, &opts.name, &opts.extension, &destination)
        .await;
    print_summary(&statuses);

    Ok(())
}

async fn run_dir(global: GlobalOptions, opts: DirOptions) -> Result<()> {
    let fleet = Fleet::discover(fleet_root(&global)?)?;
    let destination = destination(&opts.extract)?;
    let bars = MultiProgress::new();
    let dispatcher = dispatcher(&global, &bars);

    if opts.extract.update {
        print_summary(&dispatcher.update_all(&fleet).await);
    }

    let statuses = dispatcher
        .extract_directory_from_all(&fleet, &opts.tag, &opts.name, &destination)
        .await;
    print_summary(&statuses);

    Ok(())
}

async fn run_snag(global: GlobalOptions, opts: SnagOptions) -> Result<()> {
    let document = opts
        .document
        .canonicalize()
        .with_context(|| format!("failed to resolve {:?}", opts.document.display()))?;
    let snags = SnagDocument::read(&document)?.snags()?;
    let root = document
        .parent()
        .ok_or_else(|| anyhow!("snag document {:?} has no parent directory", document.display()))?;
    info!("{} snags, repositories kept in {:?}", snags.len(), root.display());

    let bars = MultiProgress::new();
    let dispatcher = dispatcher(&global, &bars);
    let cloned = dispatcher.clone_missing(root, &snags, &bars).await;
    if !cloned.is_empty() {
        print_summary(&cloned);
    }

    let fleet = Fleet::discover(root)?;
    let statuses = dispatcher.run_snags(&fleet, snags).await;
    print_summary(&statuses);

    Ok(())
}

async fn run_fetch(opts: GlobalOptions) -> Result<()> {
    let fleet = Fleet::discover(fleet_root(&opts)?)?;
    let bars = MultiProgress::new();
    let statuses = dispatcher(&opts, &bars).fetch_all(&fleet).await;
    print_summary(&statuses);

    Ok(())
}

fn run_status(opts: GlobalOptions) -> Result<()> {
    let fleet = Fleet::discover(fleet_root(&opts)?)?;
    let width = name_width(fleet.iter().map(Repo::name));
    for repo in fleet.iter() {
        match repo.summary() {
            Ok(summary) => {
                let mut line = format!("{:<width$}  {}", summary.name, summary.head);
                if let Some(branch) = &summary.branch {
                    line.push_str(format!(" [{branch}]").as_str());
                }
                if summary.dirty {
                    line.push_str(" dirty");
                }
                line.push_str(format!(", {} tags", summary.tags).as_str());
                if let (Some(ahead), Some(behind)) = (summary.ahead, summary.behind) {
                    line.push_str(format!(", ahead {ahead}, behind {behind}").as_str());
                }
                println!("{line}");
            }
            Err(error) => println!("{:<width$}  error: {error}", repo.name()),
        }
    }

    Ok(())
}

fn run_stash(global: GlobalOptions, opts: RepoNames) -> Result<()> {
    with_named_repos(&global, &opts, |repo| Ok(repo.stash()?))
}

fn run_pop(global: GlobalOptions, opts: RepoNames) -> Result<()> {
    with_named_repos(&global, &opts, |repo| Ok(repo.stash_pop()?))
}

fn with_named_repos(
    global: &GlobalOptions,
    opts: &RepoNames,
    action: impl Fn(&Repo) -> Result<()>,
) -> Result<()> {
    let fleet = Fleet::discover(fleet_root(global)?)?;
    for name in &opts.names {
        let repo = fleet
            .find_by_name(name)
            .ok_or_else(|| anyhow!("no repository named {name:?} in fleet"))?;
        action(repo)?;
    }

    Ok(())
}

fn destination(opts: &ExtractOptions) -> Result<PathBuf> {
    match &opts.destination {
        Some(path) => Ok(path.clone()),
        None => Ok(default_destination()?),
    }
}

fn name_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(0)
}

fn repo_name(id: &RepoId) -> String {
    id.as_path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.to_string())
}

fn print_summary(statuses: &HashMap<RepoId, Outcome>) {
    let mut entries = statuses.iter().collect::<Vec<_>>();
    entries.sort_by(|left, right| left.0.cmp(right.0));

    let names = entries.iter().map(|(id, _)| repo_name(id)).collect::<Vec<_>>();
    let width = name_width(names.iter().map(String::as_str));
    for (name, (_, outcome)) in names.iter().zip(entries) {
        println!("{name:<width$}  {outcome}");
    }

    let succeeded = statuses.values().filter(|outcome| outcome.is_succeeded()).count();
    let skipped = statuses.values().filter(|outcome| outcome.is_skipped()).count();
    let failed = statuses.values().filter(|outcome| outcome.is_failed()).count();
    println!("{succeeded} succeeded, {skipped} skipped, {failed} failed");
}

/// Draw progress of each repository on its own bar.
struct BarProgress {
    bars: MultiProgress,
    active: Mutex<HashMap<RepoId, ProgressBar>>,
    style: Option<ProgressStyle>,
}

impl BarProgress {
    fn new(bars: MultiProgress) -> Self {
        let style = ProgressStyle::with_template("{prefix:>20.bold}  [{bar:30.yellow/blue}]  {msg}")
            .map(|style| style.progress_chars("-Cco."))
            .ok();

        Self {
            bars,
            active: Mutex::new(HashMap::new()),
            style,
        }
    }
}

impl Progress for BarProgress {
    fn start(&self, repo: &RepoId, name: &str) {
        let bar = self.bars.add(ProgressBar::new(1));
        if let Some(style) = &self.style {
            bar.set_style(style.clone());
        }
        bar.set_prefix(name.to_owned());
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(repo.clone(), bar);
    }

    fn report(&self, repo: &RepoId, event: &ProgressEvent) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = active.get(repo) {
            bar.set_length(event.total);
            bar.set_position(event.current);
            bar.set_message(format!("{}: {}", event.phase, event.message));
        }
    }

    fn finish(&self, repo: &RepoId, _outcome: &Outcome) {
        let bar = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(repo);
        if let Some(bar) = bar {
            bar.finish_and_clear();
            self.bars.remove(&bar);
        }
    }
}

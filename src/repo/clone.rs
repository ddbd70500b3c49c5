// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Clone missing repositories.
//!
//! A snag document names repositories by URL. Repositories that are not on
//! disk yet get cloned next to the document before any extraction runs.
//! Cloning happens through libgit2 so transfer progress can be drawn on a
//! progress bar, and credentials can be prompted for without garbling it.

use crate::{
    repo::{Repo, RepoError},
    status::{Phase, ProgressEvent},
};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{build::RepoBuilder, Config, FetchOptions, RemoteCallbacks};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{cell::Cell, path::Path, time};
use tracing::{debug, info, instrument};

/// Clone repository from URL into target path.
///
/// Object transfer is drawn on `bar`, and also handed to `report` as
/// [`Phase::Clone`] events counting received objects. One last event is
/// reported once the working tree is checked out.
///
/// # Errors
///
/// - Return [`CloneError::Git2`] if libgit2 fails to clone.
/// - Return [`CloneError::Repo`] if the clone cannot be opened afterwards.
#[instrument(skip(url, path, bar, report), level = "debug")]
pub fn clone_into(
    url: &str,
    path: &Path,
    bar: ProgressBar,
    mut report: impl FnMut(ProgressEvent),
) -> Result<Repo> {
    info!("clone {url} into {:?}", path.display());
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<40}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(url.to_owned());
    bar.enable_steady_tick(time::Duration::from_millis(100));

    let prompter = CredentialPrompter::new(bar.clone());
    let authenticator = GitAuthenticator::default().set_prompter(prompter);
    let config = Config::open_default()?;

    let objects = Cell::new((0, 0));
    {
        let mut last_draw = time::Instant::now();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(authenticator.credentials(&config));
        callbacks.transfer_progress(|stats| {
            let received = stats.received_objects() as u64;
            let total = stats.total_objects() as u64;
            objects.set((received, total));
            if last_draw.elapsed() > time::Duration::from_millis(10) || received == total {
                last_draw = time::Instant::now();
                bar.set_length(total);
                bar.set_position(received);
                report(transfer_event(received, total));
            }
            true
        });

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks);
        RepoBuilder::new().fetch_options(fetch).clone(url, path)?;
    }
    bar.finish_and_clear();

    let (_, total) = objects.get();
    debug!("cloned {total} objects from {url}");
    report(ProgressEvent::new(
        Phase::Clone,
        total.max(1),
        total.max(1),
        format!("cloned {total} objects"),
    ));

    Ok(Repo::open(path)?)
}

fn transfer_event(received: u64, total: u64) -> ProgressEvent {
    ProgressEvent::new(
        Phase::Clone,
        received,
        total,
        format!("received {received}/{total} objects"),
    )
}

/// Ask for credentials on the terminal while the clone bar is hidden.
#[derive(Debug, Clone)]
pub struct CredentialPrompter {
    bar: ProgressBar,
}

impl CredentialPrompter {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for CredentialPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("{url} wants a username and password");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new(format!("Username for {url}:").as_str())
                .prompt()
                .ok()?;
            let password = Password::new(format!("Password for {username}@{url}:").as_str())
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("{url} wants a password for {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new(format!("Password for {username}@{url}:").as_str())
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        let key = ssh_key_path.display();
        info!("ssh key {key} is locked");
        self.bar.suspend(|| -> Option<String> {
            Password::new(format!("Unlock ssh key {key}:").as_str())
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Clone error types.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Fresh clone cannot be opened as a repository handle.
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Friendly result alias :3
pub type Result<T, E = CloneError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git binary invocation.
//!
//! Every operation that mutates a repository, i.e., checkout, pull, fetch,
//! stash, and merge, is handed off to the Git binary itself. Git already
//! knows how to talk to remotes, apply credential helpers, and refuse unsafe
//! checkouts, so we only sequence the calls and interpret their exit status.
//!
//! Calls never read from the terminal. Standard input is closed, and
//! `GIT_TERMINAL_PROMPT` is disabled, so a remote demanding credentials makes
//! the call fail instead of blocking a worker forever.

use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::{Command, Stdio},
};
use tracing::{debug, instrument, warn};

/// Captured result of a successful Git call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Merge stdout and stderr into one message for logging.
    pub fn message(&self) -> String {
        join_streams(&self.stdout, &self.stderr)
    }
}

/// Run Git non-interactively inside a repository's working tree.
///
/// # Errors
///
/// - Return [`SyscallError::Spawn`] if the Git binary cannot be executed.
/// - Return [`SyscallError::Failed`] if Git exits with a non-zero status.
///   The captured stdout and stderr are kept in the error.
#[instrument(skip(work_tree, args), level = "debug")]
pub fn git(
    work_tree: &Path,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<GitOutput> {
    let args = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect::<Vec<OsString>>();
    let command = render_command(&args);
    debug!("run {command:?} in {:?}", work_tree.display());

    let output = Command::new("git")
        .arg("-C")
        .arg(work_tree)
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()
        .map_err(|err| SyscallError::Spawn {
            source: err,
            command: command.clone(),
        })?;

    let stdout = chomp(String::from_utf8_lossy(output.stdout.as_slice()).into_owned());
    let stderr = chomp(String::from_utf8_lossy(output.stderr.as_slice()).into_owned());

    if !output.status.success() {
        let message = join_streams(&stdout, &stderr);
        warn!("command {command:?} failed:\n{message}");
        return Err(SyscallError::Failed {
            command,
            status: output.status.code(),
            stdout,
            stderr,
        });
    }

    Ok(GitOutput { stdout, stderr })
}

fn render_command(args: &[OsString]) -> String {
    let mut rendered = String::from("git");
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg.to_string_lossy().as_ref());
    }

    rendered
}

fn join_streams(stdout: &str, stderr: &str) -> String {
    let mut message = String::new();
    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        if !message.is_empty() {
            message.push('\n');
        }
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    message
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// Git invocation error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Git binary could not be spawned at all.
    #[error("failed to spawn {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Git ran, but reported failure.
    #[error("command {command:?} exited with status {status:?}: {}", join_streams(stdout, stderr))]
    Failed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snag files out of a fleet of Git repositories.
//!
//! A __fleet__ is every Git repository directly below one root directory.
//! Tagsnag resolves a keyword to a tag in each of them, checks that tag out,
//! and copies a matching file or directory into a per-repository destination.
//! Repositories are worked on concurrently, and each one succeeds, fails, or
//! is skipped on its own.
//!
//! The pieces, from the bottom up:
//!
//! - [`repo`] wraps one repository, and delegates mutations to Git itself.
//! - [`fleet`] discovers the repositories of a root directory.
//! - [`locate`] finds files and directories in a working tree.
//! - [`materialize`] copies what was found to its destination.
//! - [`status`] keeps the outcome of every repository.
//! - [`dispatch`] fans fleet operations out over a bounded worker pool.
//! - [`snag`] and [`config`] describe what to extract.

pub mod config;
pub mod dispatch;
pub mod fleet;
pub mod locate;
pub mod materialize;
pub mod path;
pub mod repo;
pub mod snag;
pub mod status;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations of files tagsnag writes outside of a fleet.

use std::path::PathBuf;

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to logfile.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/tagsnag/tagsnag.log`. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_logfile() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("tagsnag").join("tagsnag.log"))
        .ok_or(NoWayHome)
}

/// Determine default destination root of extracted content.
///
/// Uses `~/tagsnag` when no destination is given.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_destination() -> Result<PathBuf> {
    home_dir().map(|path| path.join("tagsnag"))
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_DATA_HOME", "/home/blah/.data")])]
    fn default_paths_follow_environment() {
        if cfg!(target_os = "linux") {
            assert_eq!(
                default_logfile().unwrap(),
                PathBuf::from("/home/blah/.data/tagsnag/tagsnag.log")
            );
            assert_eq!(
                default_destination().unwrap(),
                PathBuf::from("/home/blah/tagsnag")
            );
        }
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for files that nixsync owns, i.e.,
//! its settings file, the location record, and the canonical install target.
//! None of these functions check whether the returned path actually exists.

use std::path::PathBuf;

/// Name of the binary, used for the install target and candidate scans.
pub const BIN_NAME: &str = "nixsync";

/// Determine absolute path to user's home directory.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine absolute path to nixsync's own configuration directory.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/nixsync`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn nixsync_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join(BIN_NAME))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to settings file.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_settings_path() -> Result<PathBuf> {
    nixsync_config_dir().map(|path| path.join("config.toml"))
}

/// Determine default absolute path to the location record.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_location_path() -> Result<PathBuf> {
    nixsync_config_dir().map(|path| path.join("location"))
}

/// Determine default canonical install path of the nixsync binary.
///
/// Prefers `$XDG_BIN_HOME`, falling back to `~/.local/bin`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_install_path() -> Result<PathBuf> {
    match dirs::executable_dir() {
        Some(dir) => Ok(dir.join(BIN_NAME)),
        None => Ok(home_dir()?.join(".local").join("bin").join(BIN_NAME)),
    }
}

/// Determine fallback configuration directory used when nothing is recorded.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_config_dir() -> Result<PathBuf> {
    home_dir().map(|path| path.join("nixos-config"))
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
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_CONFIG_HOME", "/home/blah/.cfg")])]
    fn xdg_config_home_is_honoured() -> anyhow::Result<()> {
        assert_eq!(
            default_settings_path()?,
            PathBuf::from("/home/blah/.cfg/nixsync/config.toml")
        );
        assert_eq!(
            default_location_path()?,
            PathBuf::from("/home/blah/.cfg/nixsync/location")
        );
        assert_eq!(default_config_dir()?, PathBuf::from("/home/blah/nixos-config"));

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_BIN_HOME", "/opt/blah/bin")])]
    fn install_path_prefers_xdg_bin_home() -> anyhow::Result<()> {
        assert_eq!(default_install_path()?, PathBuf::from("/opt/blah/bin/nixsync"));

        Ok(())
    }
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration directory detection and resolution.

use crate::store::LocationStore;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Kind of NixOS configuration entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    /// A `flake.nix` at the top level.
    Flake,

    /// A classic `configuration.nix` at the top level.
    Classic,
}

impl ConfigKind {
    /// File name of the entry point.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Flake => "flake.nix",
            Self::Classic => "configuration.nix",
        }
    }

    /// Kind that a rebuild needs given the flake mode.
    pub fn required(use_flakes: bool) -> Self {
        if use_flakes {
            Self::Flake
        } else {
            Self::Classic
        }
    }

    /// Detect entry point in target directory.
    ///
    /// Flakes take precedence when both entry points are present.
    pub fn detect(dir: impl AsRef<Path>) -> Option<Self> {
        [Self::Flake, Self::Classic]
            .into_iter()
            .find(|kind| kind.is_present_in(dir.as_ref()))
    }

    /// Check if the entry point exists in target directory.
    pub fn is_present_in(&self, dir: impl AsRef<Path>) -> bool {
        dir.as_ref().join(self.file_name()).is_file()
    }
}

impl Display for ConfigKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.file_name())
    }
}

/// Resolve configuration directory to operate on.
///
/// The current directory wins when it holds a recognized entry point.
/// Otherwise the recorded location is used if it exists.
///
/// # Errors
///
/// - Return [`WorkdirError::NotFound`] if neither yields a directory.
#[instrument(skip(cwd, store), level = "debug")]
pub fn resolve(cwd: impl AsRef<Path>, store: &LocationStore) -> Result<PathBuf> {
    let cwd = cwd.as_ref();
    if let Some(kind) = ConfigKind::detect(cwd) {
        debug!("found {kind} in {}", cwd.display());
        return Ok(cwd.to_path_buf());
    }

    let recorded = store.load();
    if recorded.is_dir() {
        info!("using configuration directory {}", recorded.display());
        return Ok(recorded);
    }

    Err(WorkdirError::NotFound {
        cwd: cwd.to_path_buf(),
        recorded,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum WorkdirError {
    #[error(
        "no configuration found in {:?} and recorded directory {:?} does not exist",
        cwd.display(),
        recorded.display()
    )]
    NotFound { cwd: PathBuf, recorded: PathBuf },
}

/// Friendly result alias :3
type Result<T, E = WorkdirError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn detect_prefers_flake() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(ConfigKind::detect(dir.path()), None);

        fs::write(dir.path().join("configuration.nix"), "{ }")?;
        assert_eq!(ConfigKind::detect(dir.path()), Some(ConfigKind::Classic));

        fs::write(dir.path().join("flake.nix"), "{ }")?;
        assert_eq!(ConfigKind::detect(dir.path()), Some(ConfigKind::Flake));

        Ok(())
    }

    #[test]
    fn resolve_prefers_current_directory() -> anyhow::Result<()> {
        let cwd = tempfile::tempdir()?;
        let recorded = tempfile::tempdir()?;
        let state = tempfile::tempdir()?;
        fs::write(cwd.path().join("flake.nix"), "{ }")?;
        let store = LocationStore::new(state.path().join("location"), "/nowhere");
        store.save(recorded.path())?;

        assert_eq!(resolve(cwd.path(), &store)?, cwd.path());

        Ok(())
    }

    #[test]
    fn resolve_falls_back_to_record() -> anyhow::Result<()> {
        let cwd = tempfile::tempdir()?;
        let recorded = tempfile::tempdir()?;
        let state = tempfile::tempdir()?;
        let store = LocationStore::new(state.path().join("location"), "/nowhere");
        store.save(recorded.path())?;

        assert_eq!(resolve(cwd.path(), &store)?, recorded.path());

        Ok(())
    }

    #[test]
    fn resolve_fails_without_any_configuration() -> anyhow::Result<()> {
        let cwd = tempfile::tempdir()?;
        let state = tempfile::tempdir()?;
        let store = LocationStore::new(state.path().join("location"), "/nowhere/at/all");

        assert!(matches!(
            resolve(cwd.path(), &store),
            Err(WorkdirError::NotFound { .. })
        ));

        Ok(())
    }
}

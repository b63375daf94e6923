// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration sync into the system location.
//!
//! Syncing is one-way and update-only: files in the system location that are
//! newer than their counterpart in the configuration directory are never
//! overwritten, and nothing in the system location is deleted unless the user
//! explicitly asks for the system location to be cleared first. Version
//! control metadata is never copied.

use crate::{
    config::Settings,
    context::Options,
    run::{Invocation, RunError, Runner},
    store::{LocationStore, StoreError},
};

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Make system location ready to receive configuration files.
///
/// With `remove` set, the system location is deleted and recreated empty.
/// Otherwise it is only created when missing, and left alone if present.
///
/// # Errors
///
/// - Return [`SyncError::UnsafeSystemDir`] if the path is relative or root.
/// - Return [`SyncError::Clear`] if existing system location cannot be removed.
/// - Return [`SyncError::Create`] if system location cannot be created.
#[instrument(skip(system_dir), level = "debug")]
pub fn prepare_system_dir(system_dir: impl AsRef<Path>, remove: bool) -> Result<()> {
    let system_dir = system_dir.as_ref();
    if !system_dir.is_absolute() || system_dir.parent().is_none() {
        return Err(SyncError::UnsafeSystemDir(system_dir.into()));
    }

    if remove && system_dir.exists() {
        warn!("removing existing {}", system_dir.display());
        fs::remove_dir_all(system_dir).map_err(|err| SyncError::Clear {
            source: err,
            path: system_dir.into(),
        })?;
    }

    if !system_dir.is_dir() {
        info!("create {}", system_dir.display());
    }
    mkdirp::mkdirp(system_dir).map_err(|err| SyncError::Create {
        source: err,
        path: system_dir.into(),
    })?;

    Ok(())
}

/// Build rsync invocation that syncs `work_dir` into the system location.
pub fn rsync_invocation(settings: &Settings, work_dir: impl AsRef<Path>) -> Invocation {
    Invocation::new(&settings.tools.rsync)
        .args(["--archive", "--update", "--exclude=.git"])
        .arg(with_trailing_slash(work_dir.as_ref()))
        .arg(with_trailing_slash(&settings.system_dir))
}

/// Sync configuration directory into the system location.
///
/// Records `work_dir` as the configuration directory location first.
///
/// # Errors
///
/// - Return [`SyncError::Store`] if location cannot be recorded.
/// - Return [`SyncError`] if system location cannot be prepared.
/// - Return [`SyncError::Run`] if rsync fails.
#[instrument(skip_all, level = "debug")]
pub async fn copy_config_files(
    runner: &impl Runner,
    settings: &Settings,
    options: &Options,
    store: &LocationStore,
    work_dir: impl AsRef<Path>,
) -> Result<()> {
    let work_dir = work_dir.as_ref();
    store.save(work_dir)?;
    prepare_system_dir(&settings.system_dir, options.remove)?;

    let message = format!(
        "Syncing {} into {}",
        work_dir.display(),
        settings.system_dir.display()
    );
    runner
        .run(&rsync_invocation(settings, work_dir), &message, false)
        .await?;

    Ok(())
}

fn with_trailing_slash(path: &Path) -> OsString {
    let mut path = path.as_os_str().to_owned();
    if !path.to_string_lossy().ends_with('/') {
        path.push("/");
    }

    path
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("refusing to use {:?} as system location", .0.display())]
    UnsafeSystemDir(PathBuf),

    #[error("failed to clear system location {:?}", path.display())]
    Clear {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to create system location {:?}", path.display())]
    Create {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Friendly result alias :3
type Result<T, E = SyncError> = std::result::Result<T, E>;

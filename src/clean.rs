// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! System cleanup.
//!
//! Cleanup is a fixed list of independent actions run in order. The actions
//! do not depend on each other, but a failing action is still fatal to the
//! whole command. Whatever comes after it does not run.

use crate::{
    config::Settings,
    run::{Invocation, RunError, Runner},
};

use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Profile whose generations are pruned.
pub const SYSTEM_PROFILE: &str = "/nix/var/nix/profiles/system";

/// A single cleanup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanAction {
    /// Run an external program.
    Run {
        message: String,
        invocation: Invocation,
    },

    /// Remove a cache directory in-process.
    RemoveDir { message: String, path: PathBuf },
}

impl CleanAction {
    fn run(message: impl Into<String>, invocation: Invocation) -> Self {
        Self::Run {
            message: message.into(),
            invocation,
        }
    }
}

/// Assemble cleanup actions in the order they run.
///
/// Container engines are only pruned when installed. The nix evaluation
/// cache is only cleared when a home directory is known.
pub fn clean_actions(
    settings: &Settings,
    runner: &impl Runner,
    home: Option<&Path>,
) -> Vec<CleanAction> {
    let tools = &settings.tools;
    let mut actions = vec![
        CleanAction::run(
            "Vacuuming journal",
            Invocation::new(&tools.journalctl)
                .arg(format!("--vacuum-time={}", settings.clean.journal_retention)),
        ),
        CleanAction::run(
            "Cleaning temporary files",
            Invocation::new(&tools.tmpfiles).arg("--clean"),
        ),
    ];

    for engine in [&tools.docker, &tools.podman] {
        if runner.locate(OsStr::new(engine)).is_some() {
            actions.push(CleanAction::run(
                format!("Pruning {engine} data"),
                Invocation::new(engine).args(["system", "prune", "-af"]),
            ));
        } else {
            debug!("{engine} not installed, skip prune");
        }
    }

    if let Some(home) = home {
        actions.push(CleanAction::RemoveDir {
            message: "Clearing nix cache".into(),
            path: home.join(".cache").join("nix"),
        });
    }

    actions.extend([
        CleanAction::run(
            format!("Deleting generations older than {}", settings.clean.generation_age),
            Invocation::new(&tools.nix_env)
                .args(["--profile", SYSTEM_PROFILE, "--delete-generations"])
                .arg(&settings.clean.generation_age),
        ),
        CleanAction::run(
            "Collecting garbage",
            Invocation::new(&tools.nix_store).arg("--gc"),
        ),
        CleanAction::run(
            "Optimising store",
            Invocation::new(&tools.nix_store).arg("--optimise"),
        ),
    ]);

    actions
}

/// Run cleanup actions in order, stopping at the first failure.
///
/// # Errors
///
/// - Return [`CleanError::Run`] if an external action fails.
/// - Return [`CleanError::RemoveDir`] if a cache cannot be removed.
#[instrument(skip_all, level = "debug")]
pub async fn run_clean(runner: &impl Runner, actions: &[CleanAction]) -> Result<()> {
    for action in actions {
        match action {
            CleanAction::Run {
                message,
                invocation,
            } => runner.run(invocation, message, false).await?,
            CleanAction::RemoveDir { message, path } => {
                if path.exists() {
                    info!("{message}");
                    fs::remove_dir_all(path).map_err(|err| CleanError::RemoveDir {
                        source: err,
                        path: path.clone(),
                    })?;
                } else {
                    debug!("{} already absent", path.display());
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    #[error("failed to remove {:?}", path.display())]
    RemoveDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Friendly result alias :3
type Result<T, E = CleanError> = std::result::Result<T, E>;

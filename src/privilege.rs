// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Privilege escalation gate.
//!
//! Commands that touch the system location need root. Rather than wrapping
//! every external call in sudo, nixsync re-runs itself through the elevation
//! tool with the original arguments. The child process is marked through the
//! `NIXSYNC_ELEVATED` environment variable.
//!
//! # Loop Protection
//!
//! The marker is the one and only safeguard against an endless chain of
//! elevation hops. A marked process never asks to be elevated again, even if
//! it somehow still lacks root.

use crate::{config::ELEVATED_MARKER, context::RunContext, relaunch::Relaunch};

use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Mechanism used to gain root.
pub trait Elevator {
    /// Check if current process already runs as root.
    fn is_elevated(&self) -> bool;

    /// Produce relaunch request that re-runs nixsync as root.
    fn elevate(&self, context: &RunContext) -> Result<Relaunch>;
}

/// Elevation through sudo, or any tool with the same calling convention.
#[derive(Debug, Clone)]
pub struct SudoElevator {
    command: Vec<String>,
    exe: PathBuf,
}

impl SudoElevator {
    /// Construct new elevator.
    ///
    /// The `command` is the elevation program followed by its own leading
    /// arguments. The `exe` is the nixsync binary to re-run.
    pub fn new(
        command: impl IntoIterator<Item = impl Into<String>>,
        exe: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            exe: exe.into(),
        }
    }

    /// Construct elevator that re-runs the current executable.
    ///
    /// # Errors
    ///
    /// - Return [`GateError::CurrentExe`] if executable path is unknown.
    pub fn for_current_exe(command: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let exe = std::env::current_exe().map_err(GateError::CurrentExe)?;
        Ok(Self::new(command, exe))
    }
}

impl Elevator for SudoElevator {
    fn is_elevated(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn elevate(&self, context: &RunContext) -> Result<Relaunch> {
        let (program, leading) = self.command.split_first().ok_or(GateError::NoTool)?;
        let program = which::which(program).map_err(|source| GateError::MissingTool {
            source,
            tool: program.clone(),
        })?;

        let mut args: Vec<std::ffi::OsString> = leading.iter().map(Into::into).collect();
        args.push(self.exe.clone().into_os_string());
        args.extend(context.forwarded_args().iter().cloned());

        Ok(Relaunch::new(program, args).env(ELEVATED_MARKER, "1"))
    }
}

/// Outcome of the privilege gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elevation {
    /// Current process may proceed with root.
    Granted,

    /// Current process must be replaced with an elevated one.
    Relaunch(Relaunch),
}

/// Ensure command proceeds with root.
///
/// No-op when already root, or when this process is the marked child.
///
/// # Errors
///
/// - Return [`GateError`] if elevation cannot be arranged.
#[instrument(skip(elevator, context), level = "debug")]
pub fn ensure_elevated(elevator: &impl Elevator, context: &RunContext) -> Result<Elevation> {
    if context.elevated_marker {
        if !elevator.is_elevated() {
            warn!("marked as elevated, but not running as root");
        }
        debug!("elevation marker set, not elevating again");
        return Ok(Elevation::Granted);
    }

    if elevator.is_elevated() {
        debug!("already running as root");
        return Ok(Elevation::Granted);
    }

    info!("root privileges required, re-running through elevation tool");
    Ok(Elevation::Relaunch(elevator.elevate(context)?))
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No elevation tool configured.
    #[error("no elevation tool configured in elevate_with")]
    NoTool,

    /// Elevation tool is not installed.
    #[error("elevation tool {tool:?} not found")]
    MissingTool {
        #[source]
        source: which::Error,
        tool: String,
    },

    /// Path of running executable is unknown.
    #[error("cannot determine path of running executable")]
    CurrentExe(#[source] std::io::Error),
}

/// Friendly result alias :3
type Result<T, E = GateError> = std::result::Result<T, E>;

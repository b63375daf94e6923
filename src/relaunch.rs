// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Process replacement.
//!
//! Elevation and self-update both end with nixsync replacing itself with a
//! new process image. Components never do that themselves. They hand a
//! [`Relaunch`] back up to the binary's driver, which replaces the process
//! exactly once after output has been flushed.

use std::{
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{self, Write},
    os::unix::process::CommandExt,
    path::PathBuf,
    process::Command,
};
use tracing::debug;

/// Request to replace the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relaunch {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl Relaunch {
    /// Construct new relaunch request.
    pub fn new(
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Set environment variable for the new process.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        self.args.as_slice()
    }

    pub fn envs(&self) -> &[(OsString, OsString)] {
        self.envs.as_slice()
    }

    /// Replace current process image.
    ///
    /// Only returns if the replacement failed.
    pub fn exec(self) -> io::Error {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        debug!("relaunch: {self}");

        Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .exec()
    }
}

impl Display for Relaunch {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.program.display())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_joins_program_and_args() {
        let relaunch = Relaunch::new(
            "/usr/bin/sudo",
            ["-E", "/home/blah/.local/bin/nixsync", "update"],
        )
        .env("NIXSYNC_ELEVATED", "1");
        assert_eq!(
            relaunch.to_string(),
            "/usr/bin/sudo -E /home/blah/.local/bin/nixsync update"
        );
        assert_eq!(
            relaunch.envs(),
            &[(OsString::from("NIXSYNC_ELEVATED"), OsString::from("1"))]
        );
    }
}

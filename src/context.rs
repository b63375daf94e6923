// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-invocation state.
//!
//! The command line is parsed exactly once into a [`RunContext`]. Nothing
//! reads flags from ambient global state; every component that cares about
//! them is handed the context, or just its [`Options`].

use crate::config::ELEVATED_MARKER;

use std::{env, ffi::OsString};

/// Top-level commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Update,
    Upgrade,
    Clean,
    Trace,
    Build,
    Dir,
    ResetDir,
    GitCheck,
}

/// Option flags, fixed after argument parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Rebuild from a flake instead of a classic configuration.
    pub use_flakes: bool,

    /// Suppress progress and info output.
    pub quiet: bool,

    /// Clear the system location before syncing into it.
    pub remove: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            use_flakes: true,
            quiet: false,
            remove: false,
        }
    }
}

/// State of one nixsync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub command: CommandKind,
    pub options: Options,

    /// Set when this process is already the elevated child.
    ///
    /// Once set, no further elevation may be attempted.
    pub elevated_marker: bool,

    /// Original argument vector, program name included.
    pub args: Vec<OsString>,
}

impl RunContext {
    /// Construct new run context.
    pub fn new(
        command: CommandKind,
        options: Options,
        elevated_marker: bool,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            command,
            options,
            elevated_marker,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Construct run context from the live process environment.
    pub fn from_env(command: CommandKind, options: Options) -> Self {
        Self::new(command, options, marker_from_env(), env::args_os())
    }

    /// Arguments to forward to a relaunched process, program name excluded.
    pub fn forwarded_args(&self) -> &[OsString] {
        self.args.get(1..).unwrap_or_default()
    }

    /// Check if this is the first, unelevated pass of the invocation chain.
    pub fn is_first_pass(&self) -> bool {
        !self.elevated_marker
    }
}

fn marker_from_env() -> bool {
    env::var_os(ELEVATED_MARKER).is_some_and(|value| value == "1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn forwarded_args_drop_program_name() {
        let context = RunContext::new(
            CommandKind::Update,
            Options::default(),
            false,
            ["nixsync", "--no-flakes", "update"],
        );
        assert_eq!(
            context.forwarded_args(),
            &[OsString::from("--no-flakes"), OsString::from("update")]
        );

        let context = RunContext::new(
            CommandKind::Dir,
            Options::default(),
            false,
            Vec::<OsString>::new(),
        );
        assert!(context.forwarded_args().is_empty());
    }

    #[sealed_test(env = [("NIXSYNC_ELEVATED", "1")])]
    fn marker_is_read_from_environment() {
        let context = RunContext::from_env(CommandKind::Clean, Options::default());
        assert!(context.elevated_marker);
        assert!(!context.is_first_pass());
    }

    #[sealed_test(env = [("NIXSYNC_ELEVATED", "0")])]
    fn marker_requires_exact_value() {
        let context = RunContext::from_env(CommandKind::Clean, Options::default());
        assert!(context.is_first_pass());
    }
}

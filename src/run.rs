// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process runner.
//!
//! Every external collaborator (rsync, git, nixos-rebuild, the nix store
//! tools) is invoked through a [`Runner`]. Invocations are structured
//! argument vectors. No shell ever sees them, so paths and hostnames never
//! need quoting.
//!
//! # Presentation
//!
//! A child runs in one of three ways:
//!
//! 1. Quiet: all child output is discarded, only the exit status matters.
//! 2. Visible: the child inherits the terminal.
//! 3. Spinner: child output is captured while a spinner shows a message.
//!
//! Any nonzero exit status is an error. There are no retries.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, error, info, instrument};

const SPINNER_TICK: Duration = Duration::from_millis(80);
const STDERR_TAIL: usize = 20;

/// A structured command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
}

impl Invocation {
    /// Construct new invocation of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run child inside target directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        command
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program.to_string_lossy().as_ref())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Layer of indirection for running external programs.
#[allow(async_fn_in_trait)]
pub trait Runner {
    /// Locate program on `PATH`, or verify an explicit path.
    fn locate(&self, program: &OsStr) -> Option<PathBuf>;

    /// Run invocation to completion.
    ///
    /// The `message` describes the work for the spinner and log. If
    /// `show_output` is set, the child inherits the terminal.
    async fn run(&self, invocation: &Invocation, message: &str, show_output: bool) -> Result<()>;
}

/// Runner that spawns real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    quiet: bool,
    tick: Duration,
}

impl ProcessRunner {
    /// Construct new process runner.
    ///
    /// A quiet runner discards all child output and never draws a spinner.
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            tick: SPINNER_TICK,
        }
    }

    async fn run_quiet(&self, invocation: &Invocation) -> Result<()> {
        let status = invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| spawn_error(invocation, source))?;

        check(invocation, status)
    }

    async fn run_visible(&self, invocation: &Invocation, message: &str) -> Result<()> {
        info!("{message}");
        let status = invocation
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| spawn_error(invocation, source))?;

        check(invocation, status)
    }

    async fn run_with_spinner(&self, invocation: &Invocation, message: &str) -> Result<()> {
        let child = invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| spawn_error(invocation, source))?;

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?.tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✔",
            ]),
        );
        bar.set_message(message.to_string());

        // INVARIANT: Redraw on a timer while awaiting the child's exit.
        let output = child.wait_with_output();
        tokio::pin!(output);
        let mut ticker = tokio::time::interval(self.tick);
        let output = loop {
            tokio::select! {
                output = &mut output => break output,
                _ = ticker.tick() => bar.tick(),
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(source) => {
                bar.abandon();
                return Err(spawn_error(invocation, source));
            }
        };

        if output.status.success() {
            bar.finish_with_message(message.to_string());
            return Ok(());
        }

        bar.set_style(ProgressStyle::with_template("✘ {msg:.red}")?);
        bar.abandon_with_message(message.to_string());
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines = stderr.lines().collect::<Vec<_>>();
        for line in &lines[lines.len().saturating_sub(STDERR_TAIL)..] {
            error!("{line}");
        }

        check(invocation, output.status)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Runner for ProcessRunner {
    fn locate(&self, program: &OsStr) -> Option<PathBuf> {
        which::which(program).ok()
    }

    #[instrument(skip(self, invocation, message), fields(command = %invocation), level = "debug")]
    async fn run(&self, invocation: &Invocation, message: &str, show_output: bool) -> Result<()> {
        debug!("run {invocation}");
        if self.quiet {
            self.run_quiet(invocation).await
        } else if show_output {
            self.run_visible(invocation, message).await
        } else {
            self.run_with_spinner(invocation, message).await
        }
    }
}

fn spawn_error(invocation: &Invocation, source: std::io::Error) -> RunError {
    RunError::Spawn {
        source,
        command: invocation.to_string(),
    }
}

fn check(invocation: &Invocation, status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    Err(RunError::Failed {
        command: invocation.to_string(),
        status,
    })
}

/// External process error types.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Child could not be started or awaited.
    #[error("failed to run `{command}`")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Child exited unsuccessfully.
    #[error("command `{command}` failed ({status})")]
    Failed { command: String, status: ExitStatus },

    /// Style template cannot be set for spinner.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

impl RunError {
    /// Exit code of failed child, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { status, .. } => status.code(),
            _ => None,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = RunError> = std::result::Result<T, E>;

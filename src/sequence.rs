// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command sequencing.
//!
//! Each top-level command maps to a fixed, ordered list of guarded steps.
//! A step either succeeds, is skipped because the user declined something
//! optional, or fails. The first failure aborts the whole command. Side
//! effects of earlier steps, e.g., files already synced, are never rolled
//! back.
//!
//! # Passes
//!
//! Commands that need root run in up to two passes. The first pass does all
//! the interactive checking as the invoking user, then asks the privilege
//! gate for root. The gate answers with a [`Relaunch`] that bubbles up to the
//! driver as [`Outcome::Relaunch`]. The elevated second pass skips the
//! interactive checks and does the actual work.

use crate::{
    clean::{clean_actions, run_clean, CleanError},
    config::Settings,
    context::{CommandKind, RunContext},
    git::{ConfigRepo, Divergence, GitError},
    path,
    privilege::{ensure_elevated, Elevation, Elevator, GateError},
    prompt::{PromptError, Prompter},
    rebuild::{hostname_invocation, input_refresh_invocation, rebuild_invocation, Rebuild},
    relaunch::Relaunch,
    run::{Invocation, RunError, Runner},
    store::{LocationStore, StoreError},
    sync::{copy_config_files, SyncError},
    workdir::{self, ConfigKind, WorkdirError},
};

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Result of running a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Command finished.
    Done,

    /// Command continues in a replacement process.
    Relaunch(Relaunch),
}

/// Result of a single optional step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Done,

    /// User declined, or there was nothing to do.
    Skipped,
}

/// Run top-level commands against their collaborators.
pub struct Sequencer<'a, R, P, E>
where
    R: Runner,
    P: Prompter,
    E: Elevator,
{
    runner: &'a R,
    prompter: &'a P,
    elevator: &'a E,
    settings: &'a Settings,
    context: &'a RunContext,
    store: &'a LocationStore,
    cwd: PathBuf,
}

impl<'a, R, P, E> Sequencer<'a, R, P, E>
where
    R: Runner,
    P: Prompter,
    E: Elevator,
{
    /// Construct new sequencer.
    pub fn new(
        runner: &'a R,
        prompter: &'a P,
        elevator: &'a E,
        settings: &'a Settings,
        context: &'a RunContext,
        store: &'a LocationStore,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            prompter,
            elevator,
            settings,
            context,
            store,
            cwd: cwd.into(),
        }
    }

    /// Run the command selected in the run context.
    ///
    /// Commands that operate on a configuration directory resolve it before
    /// their first step runs.
    ///
    /// # Errors
    ///
    /// - Return [`SequenceError`] on the first failing step.
    #[instrument(skip(self), fields(command = ?self.context.command), level = "debug")]
    pub async fn run(&self) -> Result<Outcome> {
        match self.context.command {
            CommandKind::Update => self.update(&self.work_dir()?, Rebuild::Switch).await,
            CommandKind::Upgrade => self.update(&self.work_dir()?, Rebuild::Upgrade).await,
            CommandKind::Trace => self.trace(&self.work_dir()?).await,
            CommandKind::Build => self.build(&self.work_dir()?).await,
            CommandKind::GitCheck => self.git_check(&self.work_dir()?).await,
            CommandKind::Clean => self.clean().await,
            CommandKind::Dir => self.dir(),
            CommandKind::ResetDir => self.reset_dir(),
        }
    }

    fn work_dir(&self) -> Result<PathBuf> {
        Ok(workdir::resolve(&self.cwd, self.store)?)
    }

    async fn update(&self, work_dir: &Path, rebuild: Rebuild) -> Result<Outcome> {
        let tools = &self.settings.tools;
        self.require_tool(&tools.rsync).await?;
        if self.context.is_first_pass() {
            self.require_tool(&tools.git).await?;
            self.require_config(work_dir)?;
            if self.offer_pull(work_dir).await? == StepOutcome::Skipped {
                debug!("continuing with local configuration as is");
            }
        }

        if let Some(relaunch) = self.elevate()? {
            return Ok(Outcome::Relaunch(relaunch));
        }

        self.sync(work_dir).await?;
        if rebuild == Rebuild::Upgrade {
            let refresh = input_refresh_invocation(self.settings, &self.context.options);
            self.runner.run(&refresh, "Updating inputs", false).await?;
        }
        self.rebuild(&rebuild, false).await?;

        Ok(Outcome::Done)
    }

    async fn trace(&self, work_dir: &Path) -> Result<Outcome> {
        if let Some(relaunch) = self.elevate()? {
            return Ok(Outcome::Relaunch(relaunch));
        }

        self.require_tool(&self.settings.tools.rsync).await?;
        self.require_config(work_dir)?;
        self.sync(work_dir).await?;
        self.rebuild(&Rebuild::Trace, true).await?;

        Ok(Outcome::Done)
    }

    async fn build(&self, work_dir: &Path) -> Result<Outcome> {
        if let Some(relaunch) = self.elevate()? {
            return Ok(Outcome::Relaunch(relaunch));
        }

        self.require_tool(&self.settings.tools.rsync).await?;
        self.require_config(work_dir)?;
        self.sync(work_dir).await?;

        let host = self.prompter.hostname("Hostname to build:")?;
        let message = format!("Setting hostname to {host}");
        self.runner
            .run(&hostname_invocation(self.settings, &host), &message, false)
            .await?;
        self.rebuild(&Rebuild::Host(host), false).await?;

        Ok(Outcome::Done)
    }

    async fn clean(&self) -> Result<Outcome> {
        if let Some(relaunch) = self.elevate()? {
            return Ok(Outcome::Relaunch(relaunch));
        }

        let home = path::home_dir().ok();
        let actions = clean_actions(self.settings, self.runner, home.as_deref());
        run_clean(self.runner, &actions).await?;
        info!("system cleaned");

        Ok(Outcome::Done)
    }

    fn dir(&self) -> Result<Outcome> {
        let location = self.store.load();
        if self.store.is_recorded() {
            info!("configuration directory: {}", location.display());
        } else {
            info!("configuration directory (default): {}", location.display());
        }

        match ConfigKind::detect(&location) {
            Some(kind) => info!("found {kind}"),
            None => info!("no configuration files found"),
        }

        Ok(Outcome::Done)
    }

    fn reset_dir(&self) -> Result<Outcome> {
        self.store.reset()?;
        Ok(Outcome::Done)
    }

    async fn git_check(&self, work_dir: &Path) -> Result<Outcome> {
        self.require_tool(&self.settings.tools.git).await?;
        let Some(repo) = ConfigRepo::discover(work_dir)? else {
            warn!("{} is not a git repository", work_dir.display());
            return Ok(Outcome::Done);
        };

        info!("on branch {}", repo.branch()?);
        let status = repo.status_lines()?;
        if status.is_empty() {
            info!("working tree clean");
        } else {
            for line in status {
                info!("{line}");
            }
        }

        if self.offer_pull(work_dir).await? == StepOutcome::Done {
            info!("pulled upstream changes");
        }

        Ok(Outcome::Done)
    }

    fn elevate(&self) -> Result<Option<Relaunch>> {
        match ensure_elevated(self.elevator, self.context)? {
            Elevation::Granted => Ok(None),
            Elevation::Relaunch(relaunch) => Ok(Some(relaunch)),
        }
    }

    async fn sync(&self, work_dir: &Path) -> Result<()> {
        copy_config_files(
            self.runner,
            self.settings,
            &self.context.options,
            self.store,
            work_dir,
        )
        .await?;

        Ok(())
    }

    async fn rebuild(&self, rebuild: &Rebuild, show_output: bool) -> Result<()> {
        let invocation = rebuild_invocation(self.settings, &self.context.options, rebuild);
        self.runner
            .run(&invocation, "Rebuilding system", show_output)
            .await?;
        info!("system rebuilt");

        Ok(())
    }

    /// Make sure a required tool is installed.
    ///
    /// A missing tool is offered for installation into the user's nix
    /// profile. Declining, or the tool still missing afterwards, is fatal.
    #[instrument(skip(self), level = "debug")]
    async fn require_tool(&self, tool: &str) -> Result<PathBuf> {
        if let Some(path) = self.runner.locate(OsStr::new(tool)) {
            return Ok(path);
        }

        let package = Path::new(tool)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool.to_string());
        let question = format!("{tool} is required but not installed. Install nixpkgs#{package}?");
        if self.prompter.confirm(&question, true)? {
            let install = Invocation::new(&self.settings.tools.nix)
                .args(["profile", "install"])
                .arg(format!("nixpkgs#{package}"));
            let message = format!("Installing {package}");
            self.runner.run(&install, &message, true).await?;
        }

        self.runner
            .locate(OsStr::new(tool))
            .ok_or_else(|| SequenceError::MissingTool(tool.to_string()))
    }

    fn require_config(&self, work_dir: &Path) -> Result<ConfigKind> {
        let kind = ConfigKind::required(self.context.options.use_flakes);
        if !kind.is_present_in(work_dir) {
            return Err(SequenceError::MissingConfig {
                file: kind.file_name(),
                dir: work_dir.into(),
            });
        }

        Ok(kind)
    }

    /// Check upstream of the configuration repository, offering to pull.
    #[instrument(skip(self, work_dir), level = "debug")]
    async fn offer_pull(&self, work_dir: &Path) -> Result<StepOutcome> {
        let Some(repo) = ConfigRepo::discover(work_dir)? else {
            info!("{} is not a git repository, skip pull", work_dir.display());
            return Ok(StepOutcome::Skipped);
        };
        let repo_dir = repo.workdir().unwrap_or(work_dir).to_path_buf();
        let git = &self.settings.tools.git;

        let fetch = Invocation::new(git)
            .args(["remote", "update"])
            .current_dir(&repo_dir);
        self.runner
            .run(&fetch, "Checking for upstream changes", false)
            .await?;

        let divergence = repo.divergence()?;
        match divergence {
            Divergence::Behind => {
                if !self.prompter.confirm("Upstream has new commits. Pull them?", true)? {
                    info!("not pulling upstream changes");
                    return Ok(StepOutcome::Skipped);
                }

                let pull = Invocation::new(git).arg("pull").current_dir(&repo_dir);
                self.runner.run(&pull, "Pulling upstream changes", true).await?;
                Ok(StepOutcome::Done)
            }
            Divergence::Ahead | Divergence::Diverged => {
                warn!("configuration repository is {divergence}");
                Ok(StepOutcome::Skipped)
            }
            Divergence::UpToDate | Divergence::NoUpstream => {
                info!("configuration repository is {divergence}");
                Ok(StepOutcome::Skipped)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// Required external tool is not installed.
    #[error("required tool {0:?} is not installed")]
    MissingTool(String),

    /// Configuration entry point for the selected mode is missing.
    #[error("no {file} found in {:?}", dir.display())]
    MissingConfig { file: &'static str, dir: PathBuf },

    #[error(transparent)]
    Workdir(#[from] WorkdirError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Friendly result alias :3
type Result<T, E = SequenceError> = std::result::Result<T, E>;

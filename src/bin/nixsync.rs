// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use nixsync::{
    config::Settings,
    context::{CommandKind, Options, RunContext},
    install::Reconciler,
    path::{default_location_path, default_settings_path},
    privilege::SudoElevator,
    prompt::InquirePrompter,
    run::ProcessRunner,
    sequence::{Outcome, Sequencer},
    store::LocationStore,
    version::Version,
};

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Arg, ArgAction, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::{env, path::Path, process::exit};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "nixsync [options] <command>",
    subcommand_help_heading = "Commands",
    version,
    disable_version_flag = true
)]
struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Rebuild from a classic configuration.nix instead of a flake.
    #[arg(long, global = true)]
    pub no_flakes: bool,

    /// Clear the system location before syncing into it.
    #[arg(long, global = true)]
    pub remove: bool,

    /// Only report errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            use_flakes: !self.no_flakes,
            quiet: self.quiet,
            remove: self.remove,
        }
    }
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Sync configuration into the system location and switch to it.
    #[command(visible_alias = "u")]
    Update,

    /// Like update, but refresh inputs and channels first.
    #[command(visible_alias = "U")]
    Upgrade,

    /// Prune old generations, caches, and journal entries.
    #[command(visible_alias = "c")]
    Clean,

    /// Like update, but show evaluation traces on failure.
    #[command(visible_alias = "t")]
    Trace,

    /// Sync configuration and switch to the configuration of a host.
    #[command(visible_alias = "b")]
    Build,

    /// Show the recorded configuration directory.
    #[command(visible_alias = "d")]
    Dir,

    /// Forget the recorded configuration directory.
    #[command(visible_alias = "rd")]
    ResetDir,

    /// Show Git status of the configuration directory and offer to pull.
    #[command(visible_alias = "g")]
    GitCheck,
}

impl From<Command> for CommandKind {
    fn from(command: Command) -> Self {
        match command {
            Command::Update => Self::Update,
            Command::Upgrade => Self::Upgrade,
            Command::Clean => Self::Clean,
            Command::Trace => Self::Trace,
            Command::Build => Self::Build,
            Command::Dir => Self::Dir,
            Command::ResetDir => Self::ResetDir,
            Command::GitCheck => Self::GitCheck,
        }
    }
}

fn cli_command() -> clap::Command {
    Cli::command().arg(
        Arg::new("version")
            .short('v')
            .long("version")
            .action(ArgAction::Version)
            .help("Print version"),
    )
}

#[tokio::main]
async fn main() {
    let cli = match parse_cli() {
        Ok(cli) => cli,
        Err(code) => exit(code),
    };

    let layer = fmt::layer().compact().with_target(false).without_time();
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let Some(command) = cli.command else {
        let _ = cli_command().print_help();
        error!("no command given");
        exit(1);
    };

    match run(command.into(), cli.options()).await {
        Ok(Outcome::Done) => exit(0),
        Ok(Outcome::Relaunch(relaunch)) => {
            let program = relaunch.program().clone();
            let error = relaunch.exec();
            error!("failed to relaunch {}: {error}", program.display());
            exit(1)
        }
        Err(error) => {
            error!("{error:?}");
            exit(1)
        }
    }
}

/// Parse command line, or produce the exit code to leave with.
///
/// Help and version requests leave successfully. Anything clap rejects is
/// reported together with the full help text.
fn parse_cli() -> std::result::Result<Cli, i32> {
    let mut command = cli_command();
    let matches = match command.try_get_matches_from_mut(env::args_os()) {
        Ok(matches) => matches,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return Err(0);
        }
        Err(err) => {
            let _ = err.print();
            let _ = command.print_help();
            return Err(1);
        }
    };

    Cli::from_arg_matches(&matches).map_err(|err| {
        let _ = err.print();
        1
    })
}

async fn run(command: CommandKind, options: Options) -> Result<Outcome> {
    let context = RunContext::from_env(command, options);
    let settings = Settings::load(default_settings_path()?)?;
    let store = LocationStore::new(default_location_path()?, settings.default_config_dir()?);
    let cwd = env::current_dir().context("cannot determine current directory")?;
    let prompter = InquirePrompter;

    if context.is_first_pass() && settings.self_install {
        let exe = env::current_exe().context("cannot determine path of running executable")?;
        let reconciler = Reconciler::new(
            &prompter,
            settings.version_ordering,
            exe,
            Version::running(),
            settings.install_path()?,
            context.forwarded_args().iter().cloned(),
        );
        if let Some(relaunch) = reconciler.reconcile(&scan_roots(&cwd, &store.load()))? {
            return Ok(Outcome::Relaunch(relaunch));
        }
    } else {
        debug!("self-install skipped");
    }

    let runner = ProcessRunner::new(options.quiet);
    let elevator = SudoElevator::for_current_exe(settings.elevate_with.iter().cloned())?;
    let sequencer = Sequencer::new(&runner, &prompter, &elevator, &settings, &context, &store, cwd);

    Ok(sequencer.run().await?)
}

fn scan_roots(cwd: &Path, config_dir: &Path) -> Vec<std::path::PathBuf> {
    let mut roots = vec![cwd.to_path_buf()];
    if config_dir != cwd && config_dir.is_dir() {
        roots.push(config_dir.to_path_buf());
    }

    roots
}

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of nixsync's own settings file. The settings file is
//! entirely optional. Every key has a sane default for a stock NixOS system,
//! so a missing file simply means "use the defaults".
//!
//! # General Layout
//!
//! ```toml
//! system_dir = "/etc/nixos"
//! default_config_dir = "~/nixos-config"
//! self_install = true
//! version_ordering = "structured"
//! elevate_with = ["sudo", "--preserve-env=HOME,NIXSYNC_ELEVATED"]
//!
//! [clean]
//! generation_age = "7d"
//! journal_retention = "7d"
//!
//! [tools]
//! rsync = "rsync"
//! rebuild = "nixos-rebuild"
//! ```
//!
//! All path fields undergo shell expansion, so `~` and `$VAR` are fine.

use crate::{path, version::VersionOrdering};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Environment variable that marks a process as the elevated child.
pub const ELEVATED_MARKER: &str = "NIXSYNC_ELEVATED";

/// The stock system location that nixos-rebuild reads from.
pub const DEFAULT_SYSTEM_DIR: &str = "/etc/nixos";

/// Settings for nixsync.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Canonical system location that configuration is synced into.
    pub system_dir: PathBuf,

    /// Fallback configuration directory when nothing has been recorded yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_config_dir: Option<PathBuf>,

    /// Canonical install path of the nixsync binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,

    /// Install and update nixsync itself at startup.
    pub self_install: bool,

    /// How version strings of nixsync copies are ordered.
    pub version_ordering: VersionOrdering,

    /// Program and leading arguments used to re-run nixsync as root.
    pub elevate_with: Vec<String>,

    /// Cleanup tuning.
    pub clean: CleanSettings,

    /// External collaborators.
    pub tools: Tools,
}

impl Settings {
    /// Load settings from target file.
    ///
    /// A missing file produces default settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is malformed.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(data) => {
                debug!("load settings from {}", path.display());
                data.parse()
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.into(),
            }),
        }
    }

    /// Fallback configuration directory.
    ///
    /// # Errors
    ///
    /// - Return [`path::NoWayHome`] if home directory cannot be determined.
    pub fn default_config_dir(&self) -> path::Result<PathBuf> {
        match &self.default_config_dir {
            Some(path) => Ok(path.clone()),
            None => path::default_config_dir(),
        }
    }

    /// Canonical install path of the nixsync binary.
    ///
    /// # Errors
    ///
    /// - Return [`path::NoWayHome`] if home directory cannot be determined.
    pub fn install_path(&self) -> path::Result<PathBuf> {
        match &self.install_path {
            Some(path) => Ok(path.clone()),
            None => path::default_install_path(),
        }
    }

    /// Check if the system location is the one nixos-rebuild uses by default.
    pub fn uses_default_system_dir(&self) -> bool {
        self.system_dir == Path::new(DEFAULT_SYSTEM_DIR)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_dir: PathBuf::from(DEFAULT_SYSTEM_DIR),
            default_config_dir: None,
            install_path: None,
            self_install: true,
            version_ordering: VersionOrdering::default(),
            elevate_with: vec![
                "sudo".into(),
                format!("--preserve-env=HOME,XDG_CONFIG_HOME,XDG_BIN_HOME,RUST_LOG,{ELEVATED_MARKER}"),
            ],
            clean: CleanSettings::default(),
            tools: Tools::default(),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        settings.system_dir = expand(&settings.system_dir)?;
        settings.default_config_dir = settings
            .default_config_dir
            .as_deref()
            .map(expand)
            .transpose()?;
        settings.install_path = settings.install_path.as_deref().map(expand).transpose()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Cleanup tuning.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanSettings {
    /// Age of system generations to prune, in nix-env syntax.
    pub generation_age: String,

    /// How much journal history to keep, in journalctl syntax.
    pub journal_retention: String,
}

impl Default for CleanSettings {
    fn default() -> Self {
        Self {
            generation_age: "7d".into(),
            journal_retention: "7d".into(),
        }
    }
}

/// Program names, or absolute paths, of every external collaborator.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Tools {
    pub rsync: String,
    pub git: String,
    pub rebuild: String,
    pub nix: String,
    pub nix_channel: String,
    pub nix_env: String,
    pub nix_store: String,
    pub journalctl: String,
    pub tmpfiles: String,
    pub docker: String,
    pub podman: String,
    pub hostname: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            rsync: "rsync".into(),
            git: "git".into(),
            rebuild: "nixos-rebuild".into(),
            nix: "nix".into(),
            nix_channel: "nix-channel".into(),
            nix_env: "nix-env".into(),
            nix_store: "nix-store".into(),
            journalctl: "journalctl".into(),
            tmpfiles: "systemd-tmpfiles".into(),
            docker: "docker".into(),
            podman: "podman".into(),
            hostname: "hostname".into(),
        }
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Persisted location of the configuration directory.
//!
//! Nixsync remembers where the user's configuration tree lives so commands
//! can be issued from anywhere. The __location record__ is a plain text file
//! holding exactly one line: the absolute path of the configuration
//! directory. Writing always overwrites, so at most one location is ever
//! recorded.
//!
//! There is no locking. Nixsync is a single user tool that never runs two
//! commands against the record at once.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Store of the configuration directory location.
#[derive(Debug, Clone)]
pub struct LocationStore {
    record_path: PathBuf,
    fallback: PathBuf,
}

impl LocationStore {
    /// Construct new location store.
    ///
    /// The `fallback` path is reported whenever nothing has been recorded.
    pub fn new(record_path: impl Into<PathBuf>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            record_path: record_path.into(),
            fallback: fallback.into(),
        }
    }

    /// Path of the record file itself.
    pub fn record_path(&self) -> &Path {
        self.record_path.as_path()
    }

    /// Record configuration directory location.
    ///
    /// Creates missing parent directories, and overwrites any prior record.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::CreateParent`] if parent directory cannot be made.
    /// - Return [`StoreError::Write`] if record cannot be written.
    #[instrument(skip(self, location), level = "debug")]
    pub fn save(&self, location: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = self.record_path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| StoreError::CreateParent {
                source: err,
                path: parent.into(),
            })?;
        }

        debug!(
            "record {} into {}",
            location.as_ref().display(),
            self.record_path.display()
        );
        fs::write(
            &self.record_path,
            format!("{}\n", location.as_ref().display()),
        )
        .map_err(|err| StoreError::Write {
            source: err,
            path: self.record_path.clone(),
        })
    }

    /// Load recorded configuration directory location.
    ///
    /// Never fails. A missing, unreadable, or empty record yields the
    /// fallback path.
    pub fn load(&self) -> PathBuf {
        match fs::read_to_string(&self.record_path) {
            Ok(data) => match data.lines().next().map(str::trim) {
                Some(line) if !line.is_empty() => PathBuf::from(line),
                _ => self.fallback.clone(),
            },
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    debug!("cannot read {}: {err}", self.record_path.display());
                }
                self.fallback.clone()
            }
        }
    }

    /// Check if a location has been recorded.
    pub fn is_recorded(&self) -> bool {
        self.record_path.is_file()
    }

    /// Forget recorded configuration directory location.
    ///
    /// Resetting an absent record is not an error.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Remove`] if record exists but cannot be removed.
    #[instrument(skip(self), level = "debug")]
    pub fn reset(&self) -> Result<Reset> {
        match fs::remove_file(&self.record_path) {
            Ok(()) => {
                info!("configuration directory record removed");
                Ok(Reset::Removed)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("configuration directory was not set");
                Ok(Reset::AlreadyAbsent)
            }
            Err(err) => Err(StoreError::Remove {
                source: err,
                path: self.record_path.clone(),
            }),
        }
    }
}

/// Result of resetting the location record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reset {
    Removed,
    AlreadyAbsent,
}

/// All possible error types for location store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create directory {:?}", path.display())]
    CreateParent {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to write location record {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to remove location record {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = StoreError> = std::result::Result<T, E>;

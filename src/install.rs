// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Self-install and version reconciliation.
//!
//! Nixsync is typically shipped inside the user's configuration repository
//! and run straight from there. At startup it makes sure it runs from its
//! canonical install path, and looks around for newer copies of itself.
//!
//! # Reconciliation Pass
//!
//! 1. __Canonical install__: if the running binary is not the installed one,
//!    or the installed one has a different version, the running binary is
//!    copied over the install path. If the paths differed, the installed copy
//!    takes over through a relaunch.
//! 2. __Upstream scan__: the current directory and the recorded configuration
//!    directory are searched two levels deep for other nixsync copies.
//! 3. __Offer__: the newest copy strictly newer than the running version is
//!    offered to the user. Accepting installs it and relaunches into it.
//!
//! Every accepted update replaces the process, and the new process runs its
//! own single pass. Declining keeps the current process going.

use crate::{
    path::BIN_NAME,
    prompt::{PromptError, Prompter},
    relaunch::Relaunch,
    version::{read_embedded, select_newer, Candidate, Version, VersionOrdering},
};

use ignore::WalkBuilder;
use std::{
    ffi::OsString,
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// How deep candidate scans descend below each root.
pub const SCAN_DEPTH: usize = 2;

/// Reconcile running binary with installed and discovered copies.
#[derive(Debug)]
pub struct Reconciler<'a, P>
where
    P: Prompter,
{
    prompter: &'a P,
    ordering: VersionOrdering,
    running_exe: PathBuf,
    running_version: Version,
    install_path: PathBuf,
    forwarded_args: Vec<OsString>,
}

impl<'a, P> Reconciler<'a, P>
where
    P: Prompter,
{
    /// Construct new reconciler.
    pub fn new(
        prompter: &'a P,
        ordering: VersionOrdering,
        running_exe: impl Into<PathBuf>,
        running_version: Version,
        install_path: impl Into<PathBuf>,
        forwarded_args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            prompter,
            ordering,
            running_exe: running_exe.into(),
            running_version,
            install_path: install_path.into(),
            forwarded_args: forwarded_args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run full reconciliation pass over target scan roots.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError`] if installing or prompting fails.
    #[instrument(skip(self, roots), level = "debug")]
    pub fn reconcile(&self, roots: &[PathBuf]) -> Result<Option<Relaunch>> {
        if let Some(relaunch) = self.install_canonical()? {
            return Ok(Some(relaunch));
        }

        let candidates = self.scan(roots);
        self.offer_update(candidates)
    }

    /// Ensure running binary is the installed one.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::Copy`] if binary cannot be installed.
    #[instrument(skip(self), level = "debug")]
    pub fn install_canonical(&self) -> Result<Option<Relaunch>> {
        let path_differs = !same_file(&self.running_exe, &self.install_path);
        let installed = match read_embedded(&self.install_path) {
            Ok(version) => version,
            Err(err) => {
                debug!("no installed copy at {}: {err}", self.install_path.display());
                None
            }
        };
        let version_differs = installed.as_ref() != Some(&self.running_version);

        if !path_differs && !version_differs {
            debug!("running installed nixsync {}", self.running_version);
            return Ok(None);
        }

        info!(
            "installing nixsync {} to {}",
            self.running_version,
            self.install_path.display()
        );
        install_file(&self.running_exe, &self.install_path)?;

        if path_differs {
            return Ok(Some(self.relaunch_installed()));
        }

        Ok(None)
    }

    /// Find other nixsync copies below target roots.
    ///
    /// Copies without a readable version marker are ignored, as are the
    /// running binary and the installed one.
    pub fn scan(&self, roots: &[PathBuf]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for root in roots {
            if !root.is_dir() {
                continue;
            }

            debug!("scan {} for nixsync copies", root.display());
            let walker = WalkBuilder::new(root)
                .max_depth(Some(SCAN_DEPTH))
                .standard_filters(false)
                .filter_entry(|entry| entry.file_name() != ".git")
                .build();

            for entry in walker.filter_map(|entry| entry.ok()) {
                let is_file = entry.file_type().is_some_and(|kind| kind.is_file());
                if !is_file || entry.file_name() != BIN_NAME {
                    continue;
                }

                let path = entry.into_path();
                if same_file(&path, &self.running_exe) || same_file(&path, &self.install_path) {
                    continue;
                }
                if candidates.iter().any(|known: &Candidate| same_file(&known.path, &path)) {
                    continue;
                }

                match read_embedded(&path) {
                    Ok(Some(version)) => {
                        debug!("found nixsync {version} at {}", path.display());
                        candidates.push(Candidate { path, version });
                    }
                    Ok(None) => debug!("{} carries no version marker", path.display()),
                    Err(err) => debug!("cannot read {}: {err}", path.display()),
                }
            }
        }

        candidates
    }

    /// Offer newest candidate that is strictly newer than running version.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::Prompt`] if the user cannot be asked.
    /// - Return [`InstallError::Copy`] if the update cannot be installed.
    pub fn offer_update(&self, candidates: Vec<Candidate>) -> Result<Option<Relaunch>> {
        let Some(newest) = select_newer(&self.running_version, candidates, self.ordering) else {
            return Ok(None);
        };

        let question = format!(
            "nixsync {} is available at {} (running {}). Update?",
            newest.version,
            newest.path.display(),
            self.running_version
        );
        if !self.prompter.confirm(&question, true)? {
            info!("keeping nixsync {}", self.running_version);
            return Ok(None);
        }

        info!("updating nixsync to {}", newest.version);
        install_file(&newest.path, &self.install_path)?;

        Ok(Some(self.relaunch_installed()))
    }

    fn relaunch_installed(&self) -> Relaunch {
        Relaunch::new(&self.install_path, self.forwarded_args.iter().cloned())
    }
}

/// Copy binary into place and mark it executable.
///
/// Copies to a sibling temporary file first, then renames it over the
/// destination so a running destination binary is never written in place.
fn install_file(source: &Path, destination: &Path) -> Result<()> {
    let copy_error = |err| InstallError::Copy {
        source: err,
        from: source.into(),
        to: destination.into(),
    };

    if let Some(parent) = destination.parent() {
        mkdirp::mkdirp(parent).map_err(copy_error)?;
    }

    let staging = destination.with_file_name(format!(".{BIN_NAME}.new"));
    fs::copy(source, &staging).map_err(copy_error)?;
    fs::set_permissions(&staging, fs::Permissions::from_mode(0o755)).map_err(copy_error)?;
    if let Err(err) = fs::rename(&staging, destination) {
        if let Err(cleanup) = fs::remove_file(&staging) {
            warn!("cannot remove {}: {cleanup}", staging.display());
        }
        return Err(copy_error(err));
    }

    Ok(())
}

fn same_file(lhs: &Path, rhs: &Path) -> bool {
    if lhs == rhs {
        return true;
    }

    match (fs::canonicalize(lhs), fs::canonicalize(rhs)) {
        (Ok(lhs), Ok(rhs)) => lhs == rhs,
        _ => false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("failed to install {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Friendly result alias :3
type Result<T, E = InstallError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::tests::{HeadlessPrompter, ScriptedPrompter};
    use pretty_assertions::assert_eq;

    fn fake_binary(path: &Path, version: &str) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, format!("\x7fELF...NIXSYNC_VERSION={version}\0..."))?;
        Ok(())
    }

    #[test]
    fn running_from_elsewhere_installs_and_relaunches() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let running = dir.path().join("repo").join("nixsync");
        let installed = dir.path().join("bin").join("nixsync");
        fake_binary(&running, "0.2.0")?;
        let prompter = ScriptedPrompter::default();

        let reconciler = Reconciler::new(
            &prompter,
            VersionOrdering::Structured,
            &running,
            Version::new("0.2.0"),
            &installed,
            ["update"],
        );
        let result = reconciler.install_canonical()?;

        assert_eq!(result, Some(Relaunch::new(&installed, ["update"])));
        assert_eq!(read_embedded(&installed)?, Some(Version::new("0.2.0")));
        let mode = fs::metadata(&installed)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        Ok(())
    }

    #[test]
    fn running_installed_copy_is_left_alone() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let installed = dir.path().join("bin").join("nixsync");
        fake_binary(&installed, "0.2.0")?;
        let prompter = ScriptedPrompter::default();

        let reconciler = Reconciler::new(
            &prompter,
            VersionOrdering::Structured,
            &installed,
            Version::new("0.2.0"),
            &installed,
            ["update"],
        );
        assert_eq!(reconciler.install_canonical()?, None);

        Ok(())
    }

    #[test]
    fn scan_finds_copies_two_levels_deep() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let running = dir.path().join("bin").join("nixsync");
        fake_binary(&running, "0.2.0")?;
        fake_binary(&dir.path().join("root").join("nixsync"), "0.3.0")?;
        fake_binary(&dir.path().join("root").join("scripts").join("nixsync"), "0.4.0")?;
        fake_binary(&dir.path().join("root").join("a").join("b").join("nixsync"), "9.0.0")?;
        fs::write(dir.path().join("root").join("README"), "nixsync")?;
        let prompter = ScriptedPrompter::default();

        let reconciler = Reconciler::new(
            &prompter,
            VersionOrdering::Structured,
            &running,
            Version::new("0.2.0"),
            &running,
            Vec::<OsString>::new(),
        );
        let mut versions = reconciler
            .scan(&[dir.path().join("root"), dir.path().join("missing")])
            .into_iter()
            .map(|candidate| candidate.version.to_string())
            .collect::<Vec<_>>();
        versions.sort();

        assert_eq!(versions, vec!["0.3.0", "0.4.0"]);

        Ok(())
    }

    #[test]
    fn accepted_update_installs_candidate() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let installed = dir.path().join("bin").join("nixsync");
        let newer = dir.path().join("repo").join("nixsync");
        fake_binary(&installed, "0.2.0")?;
        fake_binary(&newer, "0.3.0")?;
        let prompter = ScriptedPrompter::confirming([true]);

        let reconciler = Reconciler::new(
            &prompter,
            VersionOrdering::Structured,
            &installed,
            Version::new("0.2.0"),
            &installed,
            ["--quiet", "clean"],
        );
        let result = reconciler.reconcile(&[dir.path().join("repo")])?;

        assert_eq!(result, Some(Relaunch::new(&installed, ["--quiet", "clean"])));
        assert_eq!(read_embedded(&installed)?, Some(Version::new("0.3.0")));
        assert_eq!(prompter.asked.borrow().len(), 1);

        Ok(())
    }

    #[test]
    fn declined_update_keeps_running() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let installed = dir.path().join("bin").join("nixsync");
        let newer = dir.path().join("repo").join("nixsync");
        fake_binary(&installed, "0.2.0")?;
        fake_binary(&newer, "0.3.0")?;
        let prompter = ScriptedPrompter::confirming([false]);

        let reconciler = Reconciler::new(
            &prompter,
            VersionOrdering::Structured,
            &installed,
            Version::new("0.2.0"),
            &installed,
            ["clean"],
        );
        assert_eq!(reconciler.reconcile(&[dir.path().join("repo")])?, None);
        assert_eq!(read_embedded(&installed)?, Some(Version::new("0.2.0")));

        Ok(())
    }

    #[test]
    fn older_copies_are_never_offered() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let installed = dir.path().join("bin").join("nixsync");
        fake_binary(&installed, "0.2.0")?;
        fake_binary(&dir.path().join("repo").join("nixsync"), "0.1.9")?;
        fake_binary(&dir.path().join("repo").join("old").join("nixsync"), "0.2.0")?;
        let prompter = ScriptedPrompter::default();

        let reconciler = Reconciler::new(
            &prompter,
            VersionOrdering::Structured,
            &installed,
            Version::new("0.2.0"),
            &installed,
            ["clean"],
        );
        assert_eq!(reconciler.reconcile(&[dir.path().join("repo")])?, None);
        assert!(prompter.asked.borrow().is_empty());

        Ok(())
    }

    #[test]
    fn update_offer_without_terminal_keeps_running() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let installed = dir.path().join("bin").join("nixsync");
        fake_binary(&installed, "0.2.0")?;
        fake_binary(&dir.path().join("repo").join("nixsync"), "0.3.0")?;

        let reconciler = Reconciler::new(
            &HeadlessPrompter,
            VersionOrdering::Structured,
            &installed,
            Version::new("0.2.0"),
            &installed,
            ["dir"],
        );
        assert_eq!(reconciler.reconcile(&[dir.path().join("repo")])?, None);
        assert_eq!(read_embedded(&installed)?, Some(Version::new("0.2.0")));

        Ok(())
    }
}

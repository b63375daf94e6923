// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version identifiers of nixsync copies.
//!
//! Every nixsync binary embeds a marker of the form `NIXSYNC_VERSION=<ver>`
//! terminated by a NUL byte. The marker lets nixsync learn the version of any
//! copy it finds on disk without ever executing that copy.
//!
//! # Ordering
//!
//! Versions can be ordered two ways. [`VersionOrdering::Structured`] compares
//! numeric components, so "0.10" is newer than "0.9". The
//! [`VersionOrdering::Lexicographic`] mode compares plain strings and exists
//! only for compatibility with older tooling. It misorders multi-digit
//! components, e.g., it considers "0.9" newer than "0.10".

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
};

/// Version of the running binary.
pub const RUNNING_VERSION: &str = env!("CARGO_PKG_VERSION");

const MARKER_PREFIX: &[u8] = b"NIXSYNC_VERSION=";
const MARKER_MAX_LEN: usize = 64;

#[used]
static EMBEDDED_MARKER: &str = concat!("NIXSYNC_VERSION=", env!("CARGO_PKG_VERSION"), "\0");

/// A version identifier as declared by a nixsync copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    /// Construct new version identifier.
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Version of the running binary.
    pub fn running() -> Self {
        Self::new(RUNNING_VERSION)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Interpret version as semantic version.
    ///
    /// Missing minor or patch components are treated as zero, so "0.86"
    /// becomes "0.86.0".
    pub fn to_semver(&self) -> Option<semver::Version> {
        let (core, rest) = match self.0.find(['-', '+']) {
            Some(index) => self.0.split_at(index),
            None => (self.0.as_str(), ""),
        };
        let components = core.split('.').count();
        let padded = match components {
            1 => format!("{core}.0.0{rest}"),
            2 => format!("{core}.0{rest}"),
            _ => self.0.clone(),
        };

        semver::Version::parse(&padded).ok()
    }
}

impl Display for Version {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Strategy used to order version identifiers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrdering {
    /// Compare numeric components.
    #[default]
    Structured,

    /// Compare plain strings.
    Lexicographic,
}

impl VersionOrdering {
    /// Compare two versions.
    ///
    /// Returns [`None`] if either version cannot be interpreted under
    /// structured ordering.
    pub fn compare(&self, lhs: &Version, rhs: &Version) -> Option<Ordering> {
        match self {
            Self::Structured => Some(lhs.to_semver()?.cmp(&rhs.to_semver()?)),
            Self::Lexicographic => Some(lhs.as_str().cmp(rhs.as_str())),
        }
    }

    /// Check if `candidate` is strictly newer than `current`.
    pub fn is_newer(&self, candidate: &Version, current: &Version) -> bool {
        self.compare(candidate, current) == Some(Ordering::Greater)
    }
}

/// A nixsync copy found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub version: Version,
}

/// Select newest candidate that is strictly newer than `running`.
///
/// Candidates with a version equal to or older than the running version are
/// never selected.
pub fn select_newer(
    running: &Version,
    candidates: impl IntoIterator<Item = Candidate>,
    ordering: VersionOrdering,
) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        if !ordering.is_newer(&candidate.version, running) {
            continue;
        }

        let replace = match &best {
            Some(current) => ordering.is_newer(&candidate.version, &current.version),
            None => true,
        };
        if replace {
            best = Some(candidate);
        }
    }

    best
}

/// The marker this binary embeds.
pub fn embedded_marker() -> &'static str {
    EMBEDDED_MARKER
}

/// Read embedded version marker of nixsync copy at target path.
///
/// Returns [`None`] if the file carries no valid marker.
///
/// # Errors
///
/// - Return [`std::io::Error`] if file cannot be read.
pub fn read_embedded(path: impl AsRef<Path>) -> std::io::Result<Option<Version>> {
    let data = fs::read(path.as_ref())?;
    Ok(find_marker(&data))
}

fn find_marker(data: &[u8]) -> Option<Version> {
    let mut offset = 0;
    while let Some(found) = data[offset..]
        .windows(MARKER_PREFIX.len())
        .position(|window| window == MARKER_PREFIX)
    {
        let start = offset + found + MARKER_PREFIX.len();
        let window = &data[start..data.len().min(start + MARKER_MAX_LEN)];

        // INVARIANT: Only accept NUL terminated markers holding a semantic version.
        //   - The bare prefix constant may also live in the binary.
        if let Some(end) = window.iter().position(|byte| *byte == 0) {
            if let Ok(text) = std::str::from_utf8(&window[..end]) {
                let version = Version::new(text);
                if version.to_semver().is_some() {
                    return Some(version);
                }
            }
        }

        offset = start;
    }

    None
}

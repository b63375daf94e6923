// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rebuild tool invocations.

use crate::{config::Settings, context::Options, run::Invocation};

use std::ffi::OsString;

/// Flavour of `nixos-rebuild switch` to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rebuild {
    /// Plain switch on the fast path.
    Switch,

    /// Switch with upgraded channels or inputs.
    Upgrade,

    /// Switch with evaluation traces shown on failure.
    Trace,

    /// Switch into configuration of target host.
    Host(String),
}

/// Build `nixos-rebuild switch` invocation.
///
/// Flake mode points the rebuild at the system location. Classic mode only
/// needs an explicit entry point when the system location is not the stock
/// `/etc/nixos`.
pub fn rebuild_invocation(settings: &Settings, options: &Options, rebuild: &Rebuild) -> Invocation {
    let invocation = Invocation::new(&settings.tools.rebuild).arg("switch");
    let invocation = match rebuild {
        Rebuild::Switch => invocation.arg("--fast"),
        Rebuild::Upgrade => invocation.arg("--upgrade"),
        Rebuild::Trace => invocation.arg("--show-trace"),
        Rebuild::Host(_) => invocation,
    };

    if options.use_flakes {
        let mut flake = settings.system_dir.as_os_str().to_owned();
        if let Rebuild::Host(host) = rebuild {
            flake.push("#");
            flake.push(host);
        }
        invocation.arg("--flake").arg(flake)
    } else if settings.uses_default_system_dir() {
        invocation
    } else {
        let mut entry = OsString::from("nixos-config=");
        entry.push(settings.system_dir.join("configuration.nix"));
        invocation.arg("-I").arg(entry)
    }
}

/// Build invocation that refreshes flake inputs or channels before upgrade.
pub fn input_refresh_invocation(settings: &Settings, options: &Options) -> Invocation {
    if options.use_flakes {
        Invocation::new(&settings.tools.nix)
            .args(["flake", "update", "--flake"])
            .arg(&settings.system_dir)
    } else {
        Invocation::new(&settings.tools.nix_channel).arg("--update")
    }
}

/// Build invocation that applies a hostname to the running system.
pub fn hostname_invocation(settings: &Settings, host: &str) -> Invocation {
    Invocation::new(&settings.tools.hostname).arg(host)
}

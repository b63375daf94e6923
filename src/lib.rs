// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sync a NixOS configuration tree into the system location and rebuild.
//!
//! Nixsync keeps a NixOS configuration in an ordinary directory, usually a
//! Git checkout in the user's home, and takes care of the chores around
//! applying it: syncing it into `/etc/nixos`, gaining root, running
//! `nixos-rebuild`, and cleaning up old generations afterwards.
//!
//! # Process Handoff
//!
//! Gaining root and updating nixsync itself both mean running a new process
//! with the original arguments. Neither happens deep inside a command.
//! Instead a [`Relaunch`](relaunch::Relaunch) is handed back to the binary,
//! which replaces the process at exactly one place.

pub mod clean;
pub mod config;
pub mod context;
pub mod git;
pub mod install;
pub mod path;
pub mod privilege;
pub mod prompt;
pub mod rebuild;
pub mod relaunch;
pub mod run;
pub mod sequence;
pub mod store;
pub mod sync;
pub mod version;
pub mod workdir;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{stderr, stdout, RepoFixture, Sandbox};

use anyhow::Result;
use nix::unistd::geteuid;
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn unknown_argument_prints_error_and_help() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let output = sandbox.run(&["--bogus"])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--bogus"));
    assert!(stdout(&output).contains("Usage"));

    Ok(())
}

#[test]
fn missing_command_prints_help_and_error() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let output = sandbox.run(&[])?;

    assert_eq!(output.status.code(), Some(1));
    let stdout = stdout(&output);
    assert!(stdout.contains("Usage"));
    assert!(stdout.contains("no command given"));

    Ok(())
}

#[test]
fn short_version_flag() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let output = sandbox.run(&["-v"])?;

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));

    Ok(())
}

#[test]
fn dir_without_record_shows_default_location() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let output = sandbox.run_in(sandbox.home(), &["dir"])?;

    assert_eq!(output.status.code(), Some(0));
    let stdout = stdout(&output);
    assert!(stdout.contains(&sandbox.home().join("nixos-config").display().to_string()));
    assert!(stdout.contains("no configuration files found"));

    Ok(())
}

#[test]
fn reset_dir_twice() -> Result<()> {
    let sandbox = Sandbox::new()?;
    fs::write(sandbox.location_record(), "/srv/nixos\n")?;

    let output = sandbox.run(&["reset-dir"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("configuration directory record removed"));
    assert!(!sandbox.location_record().exists());

    let output = sandbox.run(&["rd"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("configuration directory was not set"));

    Ok(())
}

#[test]
fn update_with_successful_rebuild() -> Result<()> {
    let sandbox = Sandbox::new()?;
    fs::write(sandbox.work_dir().join("flake.nix"), "{ }")?;

    let output = sandbox.run(&["update"])?;

    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert_eq!(
        fs::read_to_string(sandbox.location_record())?.trim(),
        sandbox.work_dir().display().to_string()
    );
    assert!(sandbox.system_dir().is_dir());

    Ok(())
}

#[test]
fn update_with_failing_rebuild_names_command() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stub("nixos-rebuild", 1)?;
    fs::write(sandbox.work_dir().join("flake.nix"), "{ }")?;

    let output = sandbox.run(&["u"])?;

    assert_eq!(output.status.code(), Some(1));
    let expect = format!(
        "nixos-rebuild switch --fast --flake {}",
        sandbox.system_dir().display()
    );
    assert!(stdout(&output).contains(&expect), "{}", stdout(&output));

    Ok(())
}

#[test]
fn remove_flag_decides_whether_system_files_survive() -> Result<()> {
    let sandbox = Sandbox::new()?;
    fs::write(sandbox.work_dir().join("flake.nix"), "{ }")?;
    fs::create_dir_all(sandbox.system_dir())?;
    let hardware = sandbox.system_dir().join("hardware-configuration.nix");
    fs::write(&hardware, "{ }")?;

    let output = sandbox.run(&["update"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(hardware.exists());

    let output = sandbox.run(&["--remove", "update"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(!hardware.exists());
    assert!(sandbox.system_dir().is_dir());

    Ok(())
}

#[test]
fn quiet_update_prints_nothing() -> Result<()> {
    let sandbox = Sandbox::new()?;
    fs::write(sandbox.work_dir().join("flake.nix"), "{ }")?;

    let output = sandbox.run(&["-q", "update"])?;

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "");

    Ok(())
}

#[test]
fn update_outside_configuration_fails() -> Result<()> {
    let sandbox = Sandbox::new()?;
    fs::remove_dir_all(sandbox.work_dir())?;

    let output = sandbox.run_in(sandbox.home(), &["update"])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("no configuration found"));

    Ok(())
}

#[test]
fn git_check_reports_branch() -> Result<()> {
    let sandbox = Sandbox::new()?;
    fs::write(sandbox.work_dir().join("flake.nix"), "{ }")?;
    let fixture = RepoFixture::new(sandbox.work_dir())?;
    fixture.commit_all("chore: initial configuration")?;
    fs::write(sandbox.work_dir().join("host.nix"), "{ }")?;

    let output = sandbox.run(&["git-check"])?;

    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("on branch main"));
    assert!(stdout.contains("?? host.nix"));
    assert!(stdout.contains("not tracking an upstream branch"));

    Ok(())
}

#[test]
fn first_pass_update_relaunches_through_elevation_command() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let called = sandbox.bin_dir().join("sudo.called");
    sandbox.stub_script(
        "sudo",
        &format!("echo \"$NIXSYNC_ELEVATED $*\" > {}\nexec \"$@\"", called.display()),
    )?;
    fs::write(sandbox.work_dir().join("flake.nix"), "{ }")?;

    let output = sandbox.run_first_pass(&["update"])?;

    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert!(stdout(&output).contains("system rebuilt"));
    if !geteuid().is_root() {
        let line = fs::read_to_string(&called)?;
        assert!(line.starts_with("1 "), "{line}");
        assert!(line.trim_end().ends_with("update"), "{line}");
    }

    Ok(())
}

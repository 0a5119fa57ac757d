//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn cli_without_subcommand_prints_usage() {
    let mut cmd = cargo_bin_cmd!("snapfleet");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[test]
fn help_lists_every_workflow() {
    let mut cmd = cargo_bin_cmd!("snapfleet");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(contains("deploy"))
        .stdout(contains("clone"))
        .stdout(contains("launch"))
        .stdout(contains("teardown"))
        .stdout(contains("list"));
}

#[test]
fn conflicting_script_flags_are_rejected() {
    let mut cmd = cargo_bin_cmd!("snapfleet");
    cmd.args([
        "deploy",
        "--startup-script",
        "#!/bin/bash",
        "--startup-script-file",
        "boot.sh",
    ]);
    cmd.assert().failure().stderr(contains("cannot be used with"));
}

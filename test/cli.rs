// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn devrepo(config_path: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("devrepo")?;
    cmd.env("RUST_LOG", "info")
        .env_remove("DEVREPO_CONFIG")
        .env_remove("DEV_WORKSPACE")
        .arg("--config")
        .arg(config_path);
    Ok(cmd)
}

#[test]
fn failure_is_reported_on_stderr() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("repos.json");

    devrepo(&config_path)?
        .args(["remove", "ghost"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("\"ghost\" is not tracked"));

    Ok(())
}

#[test]
fn unsupported_os_is_reported_on_stderr() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("repos.json");

    devrepo(&config_path)?
        .args(["set-path", "solaris", "/tmp"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("unsupported operating system"));

    Ok(())
}

#[test]
fn reports_stay_on_stdout() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("repos.json");

    devrepo(&config_path)?
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No repositories tracked."))
        .stderr(predicate::str::contains("No repositories tracked.").not());

    Ok(())
}

#[test]
fn fresh_config_is_announced_once() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("repos.json");

    let output = devrepo(&config_path)?.arg("list").output()?;
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("created config at").count(), 1);
    assert!(!stderr.contains("initialize config at"));
    assert!(config_path.exists());

    Ok(())
}

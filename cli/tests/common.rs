//! # dockrs CLI Integration Test Common Helpers
//!
//! File: cli/tests/common.rs
//!
//! ## Overview
//!
//! Shared helpers for the integration test crates in `cli/tests/`. Every
//! command runs in an isolated environment: no `DOCKER_*` variables, a
//! throwaway home/config directory and a scratch working directory, so the
//! outcome never depends on the machine's own Docker or dockrs setup.
//!
#![allow(dead_code)]

pub use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DOCKER_ENV: [&str; 6] = [
    "DOCKER_HOST",
    "DOCKER_MACHINE_NAME",
    "DOCKER_CERT_PATH",
    "DOCKER_CA_MATERIAL",
    "DOCKER_CERT_MATERIAL",
    "DOCKER_KEY_MATERIAL",
];

/// `dockrs` binary for the current test run.
pub fn dockrs_cmd() -> Command {
    Command::cargo_bin("dockrs").expect("Failed to find dockrs binary for testing")
}

/// `dockrs` binary running inside `sandbox` with a clean environment.
pub fn isolated_cmd(sandbox: &TempDir) -> Command {
    let mut cmd = dockrs_cmd();
    for key in DOCKER_ENV {
        cmd.env_remove(key);
    }
    cmd.env_remove("DOCKRS_CONFIG")
        .env_remove("RUST_LOG")
        .env("HOME", sandbox.path())
        .env("XDG_CONFIG_HOME", sandbox.path().join(".config"))
        .current_dir(sandbox.path());
    cmd
}

/// Writes `content` to `name` inside `dir` and returns the full path.
pub fn write_manifest(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write test manifest");
    path
}

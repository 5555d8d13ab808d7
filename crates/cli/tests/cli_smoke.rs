//! CLI smoke tests for miepack.
//!
//! Argument handling and validation only: nothing here reaches a build tool.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn miepack_cmd() -> Command {
  let mut cmd = cargo_bin_cmd!("miepack");
  cmd.env_remove("VIRTUAL_ENV").env_remove("RUST_LOG");
  cmd
}

fn build_args(region: &str) -> Vec<String> {
  [
    "build",
    "--template-bucket",
    "tb",
    "--code-bucket",
    "cb",
    "--version",
    "v2.0.0",
    "--region",
    region,
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  miepack_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  miepack_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("miepack"));
}

#[test]
fn subcommand_help_works() {
  for args in [&["build"][..], &["test"], &["test", "unit"], &["regions"]] {
    miepack_cmd()
      .args(args)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn build_help_lists_every_flag() {
  miepack_cmd()
    .args(["build", "--help"])
    .assert()
    .success()
    .stdout(predicate::str::contains("--template-bucket"))
    .stdout(predicate::str::contains("--code-bucket"))
    .stdout(predicate::str::contains("--no-layer"))
    .stdout(predicate::str::contains("--upload-mode"));
}

// =============================================================================
// Usage errors
// =============================================================================

#[test]
fn unknown_flag_exits_one() {
  miepack_cmd().args(["build", "--bogus"]).assert().code(1);
}

#[test]
fn missing_subcommand_exits_one() {
  miepack_cmd().assert().code(1);
}

#[test]
fn missing_parameter_names_the_flag() {
  let temp = TempDir::new().unwrap();

  miepack_cmd()
    .args(["build", "--code-bucket", "cb", "--version", "v1", "--region", "us-east-1"])
    .arg("--repo-root")
    .arg(temp.path())
    .assert()
    .code(1)
    .stderr(predicate::str::contains("--template-bucket"));
}

#[test]
fn empty_parameter_counts_as_missing() {
  let temp = TempDir::new().unwrap();
  let mut args = build_args("us-east-1");
  args[6] = String::new();

  miepack_cmd()
    .args(&args)
    .arg("--repo-root")
    .arg(temp.path())
    .assert()
    .code(1)
    .stderr(predicate::str::contains("--version"));
}

#[test]
fn unsupported_region_exits_before_staging() {
  let temp = TempDir::new().unwrap();

  miepack_cmd()
    .args(build_args("ca-central-1"))
    .arg("--repo-root")
    .arg(temp.path())
    .assert()
    .code(1)
    .stderr(predicate::str::contains("ca-central-1"));

  assert!(!temp.path().join("deployment").exists());
  assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn nested_environment_is_refused() {
  let temp = TempDir::new().unwrap();

  miepack_cmd()
    .args(build_args("us-east-1"))
    .arg("--repo-root")
    .arg(temp.path())
    .env("VIRTUAL_ENV", "/home/dev/.venv")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("already active"));

  assert!(!temp.path().join("deployment").exists());
}

// =============================================================================
// regions
// =============================================================================

#[test]
fn regions_lists_supported_regions() {
  let output = miepack_cmd().arg("regions").assert().success().get_output().stdout.clone();
  let stdout = String::from_utf8(output).unwrap();
  let regions: Vec<&str> = stdout.lines().collect();

  assert_eq!(regions.len(), 12);
  assert!(regions.contains(&"us-east-1"));
  assert!(regions.contains(&"ap-southeast-2"));
  assert!(!regions.contains(&"ca-central-1"));
}

#[test]
fn regions_json_output() {
  let output = miepack_cmd()
    .args(["regions", "-o", "json"])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();
  let regions: Vec<String> = serde_json::from_slice(&output).unwrap();

  assert_eq!(regions.len(), 12);
}

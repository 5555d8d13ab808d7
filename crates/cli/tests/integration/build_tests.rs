use std::collections::BTreeSet;
use std::fs;
use std::process::Stdio;
use std::time::{Duration, Instant};

use predicates::prelude::*;

use crate::common::{EXPECTED_URL, Project};

fn file_names(dir: &std::path::Path) -> BTreeSet<String> {
  fs::read_dir(dir)
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
    .collect()
}

#[test]
fn build_prints_and_records_template_url() {
  let project = Project::new();

  let output = project
    .miepack_cmd()
    .args(project.build_args())
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();

  let stdout = String::from_utf8(output).unwrap();
  assert_eq!(stdout.lines().last(), Some(EXPECTED_URL));
  assert_eq!(
    fs::read_to_string(project.staging().join("template_url.txt")).unwrap(),
    format!("{}\n", EXPECTED_URL)
  );
  assert!(project.env_dirs().is_empty());
}

#[test]
fn build_stages_exactly_the_manifest_archives() {
  let project = Project::new();

  project.miepack_cmd().args(project.build_args()).assert().success();

  assert_eq!(
    file_names(&project.staging().join("regional-s3-assets")),
    [
      "dataplaneapi.zip",
      "media_insights_engine_lambda_helper.zip",
      "mediainfo.zip",
      "workflow.zip",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
  );
  assert_eq!(
    fs::read_to_string(project.staging().join("global-s3-assets/media-insights-stack.template")).unwrap(),
    "CodeBucket: cb\nTemplateBucket: tb\nVersion: v2.0.0\n"
  );
  assert!(
    project
      .staging()
      .join("global-s3-assets/media-insights-dataplane-api-stack.template")
      .is_file()
  );
}

#[test]
fn build_publishes_to_regional_and_template_buckets() {
  let project = Project::new();

  project.miepack_cmd().args(project.build_args()).assert().success();

  let remote = project.remote();
  assert!(
    remote
      .join("cb-us-east-1/media_insights_engine/v2.0.0/mediainfo.zip")
      .is_file()
  );
  assert!(
    remote
      .join("tb/media_insights_engine/v2.0.0/media-insights-stack.template")
      .is_file()
  );
}

#[test]
fn rebuild_replaces_previous_staging() {
  let project = Project::new();
  project.miepack_cmd().args(project.build_args()).assert().success();
  fs::write(project.staging().join("regional-s3-assets/stale.zip"), "old").unwrap();

  project.miepack_cmd().args(project.build_args()).assert().success();

  assert!(!project.staging().join("regional-s3-assets/stale.zip").exists());
}

#[test]
fn staging_beside_template_sources_keeps_them() {
  let project = Project::new();
  let deployment = project.repo.join("deployment");

  for _ in 0..2 {
    project
      .miepack_cmd()
      .args(project.build_args())
      .args(["--staging-dir", "deployment"])
      .assert()
      .success();
  }

  assert!(deployment.join("media-insights-stack.yaml").is_file());
  assert_eq!(
    fs::read_to_string(deployment.join("template_url.txt")).unwrap(),
    format!("{}\n", EXPECTED_URL)
  );
  assert!(deployment.join("regional-s3-assets/mediainfo.zip").is_file());
}

#[test]
fn staging_at_repository_root_is_refused() {
  let project = Project::new();
  let before = file_names(&project.repo);

  project
    .miepack_cmd()
    .args(project.build_args())
    .env("MIEPACK_STAGING_DIR", ".")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("contains the repository root"));

  assert_eq!(file_names(&project.repo), before);
  assert!(project.repo.join("deployment/media-insights-stack.yaml").is_file());
}

#[test]
fn build_json_output_is_a_run_report() {
  let project = Project::new();

  let output = project
    .miepack_cmd()
    .args(["-o", "json"])
    .args(project.build_args())
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();

  let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
  assert_eq!(report["template_url"], EXPECTED_URL);
  assert_eq!(report["archives"].as_array().unwrap().len(), 4);
  assert_eq!(report["layers"], "skipped");
}

#[test]
fn install_failure_exits_one_and_removes_environment() {
  let project = Project::new();
  project.python(false);

  project
    .miepack_cmd()
    .args(project.build_args())
    .assert()
    .code(1)
    .stderr(predicate::str::contains("build tooling"));

  assert!(project.env_dirs().is_empty());
  assert!(!project.staging().join("template_url.txt").exists());
}

#[test]
fn framework_failure_exits_one() {
  let project = Project::new();
  project.script("chalice", "echo 'chalice: packaging failed' >&2\nexit 2");

  project
    .miepack_cmd()
    .args(project.build_args())
    .assert()
    .code(1)
    .stderr(predicate::str::contains("packaging failed"));

  assert!(project.env_dirs().is_empty());
}

#[test]
fn upload_failure_exits_one_without_marker() {
  let project = Project::new();
  project.script("aws", "echo 'An error occurred (AccessDenied)' >&2\nexit 1");

  project
    .miepack_cmd()
    .args(project.remote_build_args())
    .assert()
    .code(1)
    .stderr(predicate::str::contains("AccessDenied"));

  assert!(!project.staging().join("template_url.txt").exists());
  assert!(project.env_dirs().is_empty());
}

#[test]
fn missing_uploader_fails_preflight() {
  let project = Project::new();

  project
    .miepack_cmd()
    .args(project.remote_build_args())
    .assert()
    .code(1)
    .stderr(predicate::str::contains("aws"));

  assert!(!project.staging().exists());
}

#[test]
fn sigterm_during_build_removes_environment() {
  let project = Project::new();
  let started = project.tmp.with_file_name("chalice-started");
  project.script(
    "chalice",
    &format!("echo started > '{}'\nexec sleep 30", started.display()),
  );

  let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_miepack"));
  cmd
    .args(project.build_args())
    .env("PATH", project.path_var())
    .env("TMPDIR", &project.tmp)
    .env("MIEPACK_REPO_ROOT", &project.repo)
    .env_remove("MIEPACK_STAGING_DIR")
    .env_remove("VIRTUAL_ENV")
    .env_remove("RUST_LOG")
    .stdout(Stdio::null())
    .stderr(Stdio::null());
  let mut child = cmd.spawn().unwrap();

  let deadline = Instant::now() + Duration::from_secs(20);
  while !started.exists() {
    assert!(Instant::now() < deadline, "chalice never started");
    std::thread::sleep(Duration::from_millis(50));
  }
  assert_eq!(project.env_dirs().len(), 1);

  let status = std::process::Command::new("kill")
    .args(["-TERM", &child.id().to_string()])
    .status()
    .unwrap();
  assert!(status.success());

  let exit = child.wait().unwrap();
  assert_eq!(exit.code(), Some(1));
  assert!(project.env_dirs().is_empty());
  assert!(!project.staging().join("template_url.txt").exists());
}

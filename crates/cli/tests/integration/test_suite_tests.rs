use std::fs;

use predicates::prelude::*;

use crate::common::Project;

fn test_project() -> Project {
  let project = Project::new();
  project.pytest_python();
  project.write_file("test/requirements.txt", "pytest\n");
  project.write_file("test/unit/test_helper.py", "def test_ok(): pass\n");
  project.write_file("test/integ/dataplane/test_dataplane.py", "def test_ok(): pass\n");
  project
}

#[test]
fn unit_suite_passes() {
  let project = test_project();

  project
    .miepack_cmd()
    .args(["test", "unit"])
    .assert()
    .success()
    .stdout(predicate::str::contains("unit tests passed"));

  let args = fs::read_to_string(project.repo.join("pytest-args")).unwrap();
  assert!(args.contains("test/unit"));
  assert!(args.contains("no:cacheprovider"));
  assert!(project.env_dirs().is_empty());
}

#[test]
fn failing_unit_suite_exits_one() {
  let project = test_project();
  project.write_file("pytest-exit", "1\n");

  project.miepack_cmd().args(["test", "unit"]).assert().code(1);

  assert!(project.env_dirs().is_empty());
}

#[test]
fn integ_suite_requires_stack_variables() {
  let project = test_project();

  project
    .miepack_cmd()
    .args(["test", "integ", "dataplane"])
    .env_remove("MI_STACK_NAME")
    .env_remove("AWS_ACCESS_KEY_ID")
    .env_remove("AWS_SECRET_ACCESS_KEY")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("MI_STACK_NAME"));

  assert!(!project.repo.join("pytest-args").exists());
}

#[test]
fn integ_suite_runs_with_stack_variables() {
  let project = test_project();

  project
    .miepack_cmd()
    .args(["test", "integ", "dataplane"])
    .env("MI_STACK_NAME", "mie-dev")
    .env("AWS_ACCESS_KEY_ID", "AKIA")
    .env("AWS_SECRET_ACCESS_KEY", "secret")
    .env("REGION", "us-west-2")
    .assert()
    .success();

  let args = fs::read_to_string(project.repo.join("pytest-args")).unwrap();
  assert!(args.contains("test/integ/dataplane"));
}

#[test]
fn missing_suite_directory_exits_one() {
  let project = test_project();

  project
    .miepack_cmd()
    .args(["test", "unit", "no-such-component"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("no-such-component"));
}

//! Unit, integration and end-to-end test suites.
//!
//! Each suite runs pytest inside its own ephemeral environment. pytest's exit
//! status is the only result; its output goes straight to the terminal.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::exec::{ExecError, ToolEnv, run_tool_attached};
use crate::venv::{DependencyInstallError, EnvError, EphemeralEnv, InstallSpec};

/// Directory holding the suites, relative to the repository root.
pub const TEST_ROOT: &str = "test";

/// Requirements installed before any suite runs, relative to [`TEST_ROOT`].
pub const TEST_REQUIREMENTS: &str = "requirements.txt";

/// Source of the helper library the tests import.
pub const HELPER_LIBRARY_DIR: &str = "source/lib/MediaInsightsEngineLambdaHelper";

pub const PYTEST: &str = "pytest";
pub const PYTEST_ARGS: [&str; 5] = ["-s", "-W", "ignore::DeprecationWarning", "-p", "no:cacheprovider"];

/// Variables a deployed-stack suite cannot run without.
pub const STACK_ENV_VARS: [&str; 3] = ["MI_STACK_NAME", "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];

/// Sample media directory for end-to-end tests, relative to the repository root.
pub const TEST_MEDIA_DIR: &str = "test/test-media/";

/// Sample inputs the end-to-end tests read, with the value used when unset.
pub const E2E_MEDIA_DEFAULTS: [(&str, &str); 9] = [
  ("TEST_IMAGE", "sample-image.jpg"),
  ("TEST_VIDEO", "sample-video.mp4"),
  ("TEST_AUDIO", "sample-audio.m4a"),
  ("TEST_TEXT", "sample-text.txt"),
  ("TEST_JSON", "sample-data.json"),
  ("TEST_FACE_IMAGE", "sample-face.jpg"),
  ("TEST_PARALLEL_DATA", "sample-parallel-data.csv"),
  ("TEST_TERMINOLOGY", "sample-terminology.csv"),
  ("TEST_FACE_COLLECTION_ID", "temporary_face_collection"),
];

#[derive(Debug, Error)]
pub enum TestRunError {
  #[error("{suite} tests need {}", .vars.join(", "))]
  MissingEnv { suite: Suite, vars: Vec<String> },

  #[error("test directory {0} does not exist")]
  NoTests(PathBuf),

  #[error(transparent)]
  Env(#[from] EnvError),

  #[error("failed to install test requirements: {0}")]
  Install(#[from] DependencyInstallError),

  #[error("pytest not found in the test environment; add it to test/requirements.txt")]
  PytestMissing,

  #[error("{suite} tests failed (exit code {code:?})")]
  Failed { suite: Suite, code: Option<i32> },

  #[error("failed to run pytest: {0}")]
  Spawn(#[source] ExecError),

  #[error("invalid PYTHONPATH: {0}")]
  PythonPath(#[source] std::env::JoinPathsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
  Unit,
  Integ,
  E2e,
}

impl Suite {
  pub fn dir_name(self) -> &'static str {
    match self {
      Suite::Unit => "unit",
      Suite::Integ => "integ",
      Suite::E2e => "e2e",
    }
  }

  /// Whether the suite talks to a deployed stack.
  pub fn needs_stack(self) -> bool {
    !matches!(self, Suite::Unit)
  }

  /// `test/<suite>[/<component>]` under `repo_root`.
  pub fn test_dir(self, repo_root: &Path, component: Option<&str>) -> PathBuf {
    let dir = repo_root.join(TEST_ROOT).join(self.dir_name());
    match component {
      Some(component) => dir.join(component),
      None => dir,
    }
  }
}

impl fmt::Display for Suite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.dir_name())
  }
}

/// One suite invocation.
#[derive(Debug, Clone)]
pub struct TestRun {
  pub suite: Suite,
  pub component: Option<String>,
  pub repo_root: PathBuf,
  pub env_parent: Option<PathBuf>,
}

/// Check the variables `suite` depends on and derive the ones the tests read.
///
/// `MIE_REGION` is taken from `REGION` when only the latter is set, and
/// `MIE_STACK_NAME` from `MI_STACK_NAME`.
pub fn suite_env(suite: Suite, base: &ToolEnv) -> Result<ToolEnv, TestRunError> {
  if !suite.needs_stack() {
    return Ok(base.clone());
  }

  let present = |key: &str| base.lookup(key).filter(|v| !v.is_empty());

  let mut missing: Vec<String> = STACK_ENV_VARS
    .into_iter()
    .filter(|key| present(*key).is_none())
    .map(|key| key.to_string())
    .collect();
  let region = present("MIE_REGION").or_else(|| present("REGION"));
  if region.is_none() {
    missing.push("REGION or MIE_REGION".to_string());
  }
  if !missing.is_empty() {
    return Err(TestRunError::MissingEnv { suite, vars: missing });
  }

  let mut env = base.clone();
  if let Some(region) = region {
    env = env.set("MIE_REGION", region);
  }
  if present("MIE_STACK_NAME").is_none()
    && let Some(stack) = present("MI_STACK_NAME")
  {
    env = env.set("MIE_STACK_NAME", stack);
  }
  Ok(env)
}

/// Fill in the sample-media variables the end-to-end suite reads.
///
/// Values already present in `env` are kept. `TEST_MEDIA_PATH` defaults to
/// [`TEST_MEDIA_DIR`] under `repo_root`.
pub fn e2e_media_env(mut env: ToolEnv, repo_root: &Path) -> ToolEnv {
  let unset = |env: &ToolEnv, key: &str| env.lookup(key).is_none_or(|v| v.is_empty());

  if unset(&env, "TEST_MEDIA_PATH") {
    env = env.set("TEST_MEDIA_PATH", repo_root.join(TEST_MEDIA_DIR));
  }
  for (key, default) in E2E_MEDIA_DEFAULTS {
    if unset(&env, key) {
      env = env.set(key, default);
    }
  }
  env
}

fn python_path(env: &ToolEnv, repo_root: &Path) -> Result<OsString, TestRunError> {
  let mut entries = vec![repo_root.join(HELPER_LIBRARY_DIR)];
  if let Some(existing) = env.lookup("PYTHONPATH") {
    entries.extend(std::env::split_paths(&existing));
  }
  std::env::join_paths(entries).map_err(TestRunError::PythonPath)
}

/// Run one suite to completion.
pub async fn run_suite(run: &TestRun, python: &Path, base: &ToolEnv) -> Result<(), TestRunError> {
  let dir = run.suite.test_dir(&run.repo_root, run.component.as_deref());
  let mut suite_env = suite_env(run.suite, base)?;
  if run.suite == Suite::E2e {
    suite_env = e2e_media_env(suite_env, &run.repo_root);
  }
  if !dir.is_dir() {
    return Err(TestRunError::NoTests(dir));
  }

  let env = match &run.env_parent {
    Some(parent) => EphemeralEnv::create_in(parent, python, &suite_env).await?,
    None => EphemeralEnv::create(python, &suite_env).await?,
  };

  let requirements = run.repo_root.join(TEST_ROOT).join(TEST_REQUIREMENTS);
  if requirements.is_file() {
    env
      .install(&InstallSpec {
        packages: Vec::new(),
        requirements: Some(requirements),
      })
      .await?;
  } else {
    warn!(path = %requirements.display(), "no test requirements file");
  }

  let pytest = env.tool_env().resolve(PYTEST).ok_or(TestRunError::PytestMissing)?;
  let tool_env = env
    .tool_env()
    .clone()
    .set("PYTHONPATH", python_path(env.tool_env(), &run.repo_root)?);

  info!(suite = %run.suite, dir = %dir.display(), "running tests");
  let mut args: Vec<&OsStr> = PYTEST_ARGS.into_iter().map(OsStr::new).collect();
  args.push(dir.as_os_str());

  let result = run_tool_attached(&pytest, &args, &run.repo_root, &tool_env).await;
  env.close();

  match result {
    Ok(()) => {
      info!(suite = %run.suite, "tests passed");
      Ok(())
    }
    Err(ExecError::Failed { code, .. }) => Err(TestRunError::Failed { suite: run.suite, code }),
    Err(e) => Err(TestRunError::Spawn(e)),
  }
}

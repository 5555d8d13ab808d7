//! Implementation of the `miepack test` commands.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use miepack_lib::exec::ToolEnv;
use miepack_lib::pipeline::shutdown_signal;
use miepack_lib::preflight::{ToolRequirement, check_not_nested_in_process, check_tools};
use miepack_lib::testrun::{Suite, TestRun, run_suite};

use crate::TestCommand;
use crate::output::print_success;

pub fn cmd_test(command: TestCommand) -> Result<()> {
  let (suite, component, repo_root) = match command {
    TestCommand::Unit { component, repo_root } => (Suite::Unit, component, repo_root),
    TestCommand::Integ { component, repo_root } => (Suite::Integ, component, repo_root),
    TestCommand::E2e { repo_root } => (Suite::E2e, None, repo_root),
  };

  check_not_nested_in_process()?;
  let env = ToolEnv::from_process();
  let python_req = ToolRequirement::python();
  let tools = check_tools(std::slice::from_ref(&python_req), &env)?;
  let python: PathBuf = tools
    .get(python_req.capability)
    .map(PathBuf::from)
    .context("python interpreter not resolved")?;

  let run = TestRun {
    suite,
    component,
    repo_root: dunce::canonicalize(&repo_root)
      .with_context(|| format!("repository root {} is not accessible", repo_root.display()))?,
    env_parent: None,
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    tokio::select! {
      result = run_suite(&run, &python, &env) => result.map_err(anyhow::Error::from),
      signal = shutdown_signal() => bail!("interrupted by {}", signal),
    }
  })?;

  print_success(&format!("{} tests passed", suite));
  Ok(())
}

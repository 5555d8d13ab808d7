//! Subprocess invocation.
//!
//! Runs one external tool to completion with an explicit working directory
//! and environment. Children are killed if the awaiting future is dropped,
//! which is how an interrupted run stops its in-flight tool.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::{ExecError, ToolEnv};

/// Number of trailing stderr lines kept in [`ExecError::Failed`].
const STDERR_TAIL_LINES: usize = 5;

/// Captured output of a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
  /// Trimmed stdout.
  pub stdout: String,
}

/// Run `program` with `args` in `cwd`.
///
/// # Returns
///
/// The trimmed stdout on a zero exit status. A non-zero status becomes
/// [`ExecError::Failed`] carrying the last few stderr lines; the full streams
/// are logged at debug level.
pub async fn run_tool<I, S>(program: &Path, args: I, cwd: &Path, env: &ToolEnv) -> Result<ToolOutput, ExecError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
  let command_line = display_command(program, &args);

  info!(cmd = %command_line, "running");

  let mut command = Command::new(program);
  command
    .args(&args)
    .current_dir(cwd)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  env.apply(&mut command);

  debug!(working_dir = %cwd.display(), "spawning process");

  let output = command.output().await.map_err(|source| ExecError::Spawn {
    program: program.display().to_string(),
    source,
  })?;

  let stdout = String::from_utf8_lossy(&output.stdout);
  let stderr = String::from_utf8_lossy(&output.stderr);

  if !output.status.success() {
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(ExecError::Failed {
      command: command_line,
      code: output.status.code(),
      stderr_tail: tail_lines(&stderr, STDERR_TAIL_LINES),
    });
  }

  let stdout = stdout.trim().to_string();
  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(ToolOutput { stdout })
}

/// Run `program` with the driver's stdout and stderr attached.
///
/// For tools whose output is the result, like a test runner. A non-zero
/// status becomes [`ExecError::Failed`] with an empty stderr tail.
pub async fn run_tool_attached<I, S>(program: &Path, args: I, cwd: &Path, env: &ToolEnv) -> Result<(), ExecError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
  let command_line = display_command(program, &args);

  info!(cmd = %command_line, "running");

  let mut command = Command::new(program);
  command
    .args(&args)
    .current_dir(cwd)
    .stdin(Stdio::null())
    .kill_on_drop(true);
  env.apply(&mut command);

  let status = command.status().await.map_err(|source| ExecError::Spawn {
    program: program.display().to_string(),
    source,
  })?;

  if !status.success() {
    return Err(ExecError::Failed {
      command: command_line,
      code: status.code(),
      stderr_tail: String::new(),
    });
  }
  Ok(())
}

fn display_command(program: &Path, args: &[std::ffi::OsString]) -> String {
  let name = program
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_else(|| program.display().to_string());

  let mut line = name;
  for arg in args {
    line.push(' ');
    line.push_str(&arg.to_string_lossy());
  }
  line
}

fn tail_lines(text: &str, count: usize) -> String {
  let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
  let start = lines.len().saturating_sub(count);
  lines[start..].join("\n")
}

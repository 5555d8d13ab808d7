//! External tool execution.
//!
//! Every subprocess the build launches goes through [`run_tool`] with an
//! explicit working directory and an explicit [`ToolEnv`]; the driver process
//! never changes its own directory or environment.

pub mod cmd;
pub mod tool_env;

use std::io;

use thiserror::Error;

pub use cmd::{ToolOutput, run_tool, run_tool_attached};
pub use tool_env::ToolEnv;

/// Errors that can occur while running an external tool.
#[derive(Debug, Error)]
pub enum ExecError {
  /// The process could not be started.
  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  /// The process ran and exited unsuccessfully.
  #[error("{command} exited with code {code:?}: {stderr_tail}")]
  Failed {
    command: String,
    code: Option<i32>,
    stderr_tail: String,
  },

  /// PATH could not be rebuilt from its entries.
  #[error("invalid PATH entry: {0}")]
  JoinPaths(#[from] std::env::JoinPathsError),
}


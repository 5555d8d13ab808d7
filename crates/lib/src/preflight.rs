//! Environment checks that run before any build work starts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::VIRTUAL_ENV_VAR;
use crate::exec::ToolEnv;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreflightError {
  #[error("required {capability} not found on PATH (looked for: {aliases})")]
  MissingTool { capability: &'static str, aliases: String },

  #[error("a Python virtual environment is already active (VIRTUAL_ENV={0}); deactivate it and retry")]
  AlreadyActive(String),
}

/// An executable the build needs, with the names it may go by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequirement {
  pub capability: &'static str,
  pub aliases: Vec<&'static str>,
}

impl ToolRequirement {
  pub fn new(capability: &'static str, aliases: &[&'static str]) -> Self {
    Self {
      capability,
      aliases: aliases.to_vec(),
    }
  }

  pub fn python() -> Self {
    Self::new("python interpreter", &["python3", "python"])
  }

  pub fn uploader() -> Self {
    Self::new("object store uploader", &["aws"])
  }
}

/// Absolute paths of every resolved requirement, keyed by capability.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTools {
  paths: BTreeMap<&'static str, PathBuf>,
}

impl ResolvedTools {
  pub fn get(&self, capability: &str) -> Option<&Path> {
    self.paths.get(capability).map(PathBuf::as_path)
  }
}

/// Resolve every requirement on `env`'s PATH.
///
/// Fails on the first requirement none of whose aliases resolve.
pub fn check_tools(requirements: &[ToolRequirement], env: &ToolEnv) -> Result<ResolvedTools, PreflightError> {
  let mut resolved = ResolvedTools::default();

  for req in requirements {
    let Some((name, path)) = env.resolve_first(&req.aliases) else {
      return Err(PreflightError::MissingTool {
        capability: req.capability,
        aliases: req.aliases.join(", "),
      });
    };
    debug!(capability = req.capability, tool = name, "requirement satisfied");
    resolved.paths.insert(req.capability, path);
  }

  Ok(resolved)
}

/// Refuse to build from inside an already-active virtual environment.
pub fn check_not_nested(virtual_env: Option<&str>) -> Result<(), PreflightError> {
  match virtual_env {
    Some(value) if !value.is_empty() => Err(PreflightError::AlreadyActive(value.to_string())),
    _ => Ok(()),
  }
}

/// [`check_not_nested`] against the driver's own environment.
pub fn check_not_nested_in_process() -> Result<(), PreflightError> {
  let value = std::env::var(VIRTUAL_ENV_VAR).ok();
  check_not_nested(value.as_deref())
}

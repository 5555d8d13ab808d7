//! Explicit environment handed to child processes.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use super::ExecError;

/// The PATH and variable overrides applied to every spawned tool.
///
/// Children inherit the driver's environment; a `ToolEnv` only records what
/// differs from it. Activating the ephemeral Python environment produces a new
/// `ToolEnv` rather than mutating the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolEnv {
  path: OsString,
  vars: BTreeMap<String, OsString>,
  removed: BTreeSet<String>,
}

impl ToolEnv {
  /// Start from the driver's own PATH.
  pub fn from_process() -> Self {
    Self::with_path(env::var_os("PATH").unwrap_or_default())
  }

  pub fn with_path(path: impl Into<OsString>) -> Self {
    Self {
      path: path.into(),
      ..Default::default()
    }
  }

  pub fn path(&self) -> &OsStr {
    &self.path
  }

  /// Returns a copy with `dir` placed in front of every other PATH entry.
  pub fn prepend_path(&self, dir: &Path) -> Result<Self, ExecError> {
    let mut entries = vec![dir.to_path_buf()];
    entries.extend(env::split_paths(&self.path));

    let mut next = self.clone();
    next.path = env::join_paths(entries)?;
    Ok(next)
  }

  pub fn set(mut self, key: &str, value: impl Into<OsString>) -> Self {
    self.removed.remove(key);
    self.vars.insert(key.to_string(), value.into());
    self
  }

  pub fn remove(mut self, key: &str) -> Self {
    self.vars.remove(key);
    self.removed.insert(key.to_string());
    self
  }

  pub fn get(&self, key: &str) -> Option<&OsStr> {
    self.vars.get(key).map(OsString::as_os_str)
  }

  /// The value a child would see for `key`: the override if any, otherwise
  /// the driver's own variable unless it was removed.
  pub fn lookup(&self, key: &str) -> Option<OsString> {
    if self.removed.contains(key) {
      return None;
    }
    match self.vars.get(key) {
      Some(value) => Some(value.clone()),
      None => env::var_os(key),
    }
  }

  pub fn apply(&self, command: &mut Command) {
    command.env("PATH", &self.path);
    for key in &self.removed {
      command.env_remove(key);
    }
    for (key, value) in &self.vars {
      command.env(key, value);
    }
  }

  /// Resolve an executable name against this environment's PATH.
  pub fn resolve(&self, name: &str) -> Option<PathBuf> {
    let cwd = env::current_dir().unwrap_or_default();
    which::which_in(name, Some(&self.path), cwd).ok()
  }

  /// Resolve the first name in `candidates` that exists on PATH.
  ///
  /// Candidates are tried in order; the returned name is the alias that
  /// matched.
  pub fn resolve_first<'a>(&self, candidates: &[&'a str]) -> Option<(&'a str, PathBuf)> {
    for name in candidates {
      if let Some(path) = self.resolve(name) {
        debug!(tool = %name, path = %path.display(), "resolved tool");
        return Some((name, path));
      }
      debug!(tool = %name, "tool not found on PATH");
    }
    None
  }
}

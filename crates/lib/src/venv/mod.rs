//! Ephemeral, run-scoped Python environment.
//!
//! The build tooling (`chalice`, `wheel`, the AWS SDK used by the packaging
//! scripts) is installed into a throwaway virtual environment that lives in a
//! uniquely named temporary directory. The directory is owned by
//! [`EphemeralEnv`] and removed when the value is closed or dropped, so every
//! exit path, including a cancelled pipeline future, tears it down.
//!
//! Activation does not touch the driver's environment: [`EphemeralEnv::tool_env`]
//! returns the [`ToolEnv`] every child process must be started with.

pub mod install;

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{ENV_DIR_PREFIX, VIRTUAL_ENV_VAR};
use crate::exec::{ExecError, ToolEnv, run_tool};

pub use install::{DependencyInstallError, INSTALLER_ALIASES, InstallSpec, Installer};

#[derive(Debug, Error)]
pub enum EnvError {
  #[error("failed to create environment directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to create virtual environment: {0}")]
  Venv(#[source] ExecError),

  #[error("failed to activate virtual environment: {0}")]
  Activate(#[source] ExecError),

  #[error("failed to prepare scratch directory {path}: {source}")]
  Scratch {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A created and activated virtual environment.
#[derive(Debug)]
pub struct EphemeralEnv {
  dir: Option<TempDir>,
  root: PathBuf,
  venv: PathBuf,
  tool_env: ToolEnv,
}

impl EphemeralEnv {
  /// Create an environment under the system temp directory.
  pub async fn create(python: &Path, base: &ToolEnv) -> Result<Self, EnvError> {
    Self::create_in(&std::env::temp_dir(), python, base).await
  }

  /// Create an environment under `parent`.
  ///
  /// Runs `python -m venv` in a fresh `miepack-env-*` directory and derives
  /// the activated tool environment from `base`. If venv creation fails the
  /// directory is removed before returning.
  pub async fn create_in(parent: &Path, python: &Path, base: &ToolEnv) -> Result<Self, EnvError> {
    let dir = tempfile::Builder::new()
      .prefix(ENV_DIR_PREFIX)
      .tempdir_in(parent)
      .map_err(EnvError::CreateDir)?;
    let root = dir.path().to_path_buf();
    let venv = root.join("venv");

    run_tool(python, [OsStr::new("-m"), OsStr::new("venv"), venv.as_os_str()], &root, base)
      .await
      .map_err(EnvError::Venv)?;

    let tool_env = base
      .prepend_path(&bin_dir(&venv))
      .map_err(EnvError::Activate)?
      .set(VIRTUAL_ENV_VAR, venv.as_os_str())
      .remove("PYTHONHOME");

    info!(path = %root.display(), "created ephemeral environment");

    Ok(Self {
      dir: Some(dir),
      root,
      venv,
      tool_env,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn venv(&self) -> &Path {
    &self.venv
  }

  /// Environment for child processes, with the venv activated.
  pub fn tool_env(&self) -> &ToolEnv {
    &self.tool_env
  }

  /// Install packages into the environment itself.
  pub async fn install(&self, spec: &InstallSpec) -> Result<(), DependencyInstallError> {
    if spec.is_empty() {
      return Ok(());
    }
    let installer = Installer::resolve(&self.tool_env)?;
    installer.install(spec, None, &self.root, &self.tool_env).await
  }

  /// A fresh, empty scratch directory named `name` inside the environment.
  pub fn scratch_dir(&self, name: &str) -> Result<PathBuf, EnvError> {
    let path = self.root.join("scratch").join(name);
    if path.exists() {
      fs::remove_dir_all(&path).map_err(|source| EnvError::Scratch {
        path: path.clone(),
        source,
      })?;
    }
    fs::create_dir_all(&path).map_err(|source| EnvError::Scratch {
      path: path.clone(),
      source,
    })?;
    Ok(path)
  }

  /// Deactivate and delete the environment.
  ///
  /// Removal errors are logged, not returned: teardown must never turn a
  /// successful build into a failure.
  pub fn close(mut self) {
    if let Some(dir) = self.dir.take() {
      match dir.close() {
        Ok(()) => info!(path = %self.root.display(), "removed ephemeral environment"),
        Err(e) => warn!(path = %self.root.display(), error = %e, "failed to remove ephemeral environment"),
      }
    }
  }
}

impl Drop for EphemeralEnv {
  fn drop(&mut self) {
    if let Some(dir) = self.dir.take() {
      debug!(path = %self.root.display(), "removing ephemeral environment on drop");
      drop(dir);
    }
  }
}

#[cfg(unix)]
fn bin_dir(venv: &Path) -> PathBuf {
  venv.join("bin")
}

#[cfg(windows)]
fn bin_dir(venv: &Path) -> PathBuf {
  venv.join("Scripts")
}

//! Package installation with the first available installer alias.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::exec::{ExecError, ToolEnv, run_tool};

/// Installer names, in the order they are tried.
pub const INSTALLER_ALIASES: [&str; 2] = ["pip", "pip3"];

#[derive(Debug, Error)]
pub enum DependencyInstallError {
  #[error("no package installer found on PATH (looked for: {0})")]
  NoInstaller(String),

  #[error("installing {what} with {installer} failed: {source}")]
  InstallFailed {
    what: String,
    installer: String,
    #[source]
    source: ExecError,
  },
}

/// What to install: named packages, a requirements file, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSpec {
  pub packages: Vec<String>,
  pub requirements: Option<PathBuf>,
}

impl InstallSpec {
  pub fn packages(packages: &[String]) -> Self {
    Self {
      packages: packages.to_vec(),
      requirements: None,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.packages.is_empty() && self.requirements.is_none()
  }

  fn describe(&self) -> String {
    let mut parts = self.packages.clone();
    if let Some(req) = &self.requirements {
      parts.push(format!("-r {}", req.display()));
    }
    parts.join(" ")
  }
}

/// A resolved package installer.
#[derive(Debug, Clone)]
pub struct Installer {
  name: &'static str,
  program: PathBuf,
}

impl Installer {
  /// Resolve the first installer alias on `env`'s PATH.
  pub fn resolve(env: &ToolEnv) -> Result<Self, DependencyInstallError> {
    env
      .resolve_first(&INSTALLER_ALIASES)
      .map(|(name, program)| Self { name, program })
      .ok_or_else(|| DependencyInstallError::NoInstaller(INSTALLER_ALIASES.join(", ")))
  }

  /// Install `spec`, into `target` when given, otherwise into the active
  /// environment.
  pub async fn install(
    &self,
    spec: &InstallSpec,
    target: Option<&Path>,
    cwd: &Path,
    env: &ToolEnv,
  ) -> Result<(), DependencyInstallError> {
    if spec.is_empty() {
      return Ok(());
    }

    let mut args: Vec<String> = vec![
      "install".to_string(),
      "--quiet".to_string(),
      "--disable-pip-version-check".to_string(),
    ];
    if let Some(target) = target {
      args.push("--target".to_string());
      args.push(target.display().to_string());
    }
    if let Some(req) = &spec.requirements {
      args.push("-r".to_string());
      args.push(req.display().to_string());
    }
    args.extend(spec.packages.iter().cloned());

    info!(installer = self.name, what = %spec.describe(), "installing dependencies");

    run_tool(&self.program, &args, cwd, env)
      .await
      .map_err(|source| DependencyInstallError::InstallFailed {
        what: spec.describe(),
        installer: self.name.to_string(),
        source,
      })?;

    Ok(())
  }
}

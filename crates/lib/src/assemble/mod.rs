//! Artifact assembly.
//!
//! Each [`BuildUnit`] produces exactly one archive in the regional staging
//! directory, using the strategy for its [`UnitKind`]. Units are assembled
//! one at a time in manifest order.

pub mod bundle;
mod download;
pub mod framework;
pub mod layers;
pub mod plain;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, info, info_span};

use crate::archive::{ArchiveBuilder, ArchiveError};
use crate::manifest::{BuildUnit, FrameworkSpec, UnitKind};
use crate::staging::{StagingError, StagingLayout};
use crate::venv::{DependencyInstallError, EnvError, EphemeralEnv};

pub use download::DownloadError;
pub use framework::DelegateBuildError;
pub use layers::{LayerBuilder, LayerError, LayerFailure, LayerOutcome, LayerSource, LayerStrategy};

#[derive(Debug, Error)]
pub enum AssembleError {
  #[error("failed to archive unit '{unit}': {source}")]
  Archive {
    unit: String,
    #[source]
    source: ArchiveError,
  },

  #[error(transparent)]
  Install(#[from] DependencyInstallError),

  #[error(transparent)]
  Delegate(#[from] DelegateBuildError),

  #[error(transparent)]
  Env(#[from] EnvError),

  #[error(transparent)]
  Staging(#[from] StagingError),

  #[error("staged archives do not match the manifest (missing: [{}], unexpected: [{}])", .missing.join(", "), .unexpected.join(", "))]
  ArchiveSetMismatch {
    missing: Vec<String>,
    unexpected: Vec<String>,
  },
}

/// Whether an archive was produced by this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOrigin {
  Built,
  Reused,
}

/// Result of assembling one unit.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledUnit {
  pub name: String,
  pub kind: UnitKind,
  pub archive: PathBuf,
  pub origin: UnitOrigin,
  /// Template fragment emitted alongside the archive, if any.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub template: Option<PathBuf>,
}

/// Everything a unit strategy needs, with absolute paths only.
pub struct AssembleContext<'a> {
  pub repo_root: &'a Path,
  pub layout: &'a StagingLayout,
  pub env: &'a EphemeralEnv,
  pub framework: &'a FrameworkSpec,
  /// Archives carried over from a previous run.
  pub reused: &'a BTreeSet<String>,
  pub builder: ArchiveBuilder,
}

impl AssembleContext<'_> {
  /// Unit sources resolved against the repository root.
  pub fn sources(&self, unit: &BuildUnit) -> Vec<PathBuf> {
    unit.sources.iter().map(|s| self.repo_root.join(s)).collect()
  }

  pub fn resolve(&self, path: &Path) -> PathBuf {
    self.repo_root.join(path)
  }
}

pub(crate) fn archive_err(unit: &BuildUnit) -> impl FnOnce(ArchiveError) -> AssembleError + '_ {
  move |source| AssembleError::Archive {
    unit: unit.name.clone(),
    source,
  }
}

/// Assemble one unit into the regional staging directory.
pub async fn assemble_unit(ctx: &AssembleContext<'_>, unit: &BuildUnit) -> Result<AssembledUnit, AssembleError> {
  let span = info_span!("unit", name = %unit.name, kind = %unit.kind);

  async {
    let assembled = match unit.kind {
      UnitKind::PlainZip => plain::assemble(ctx, unit)?,
      UnitKind::DependencyBundle => bundle::assemble(ctx, unit).await?,
      UnitKind::FrameworkPackaged => framework::assemble(ctx, unit).await?,
    };
    info!(archive = %assembled.archive.display(), origin = ?assembled.origin, "unit assembled");
    Ok(assembled)
  }
  .instrument(span)
  .await
}

/// Assemble every unit in order, stopping at the first failure.
pub async fn assemble_units(
  ctx: &AssembleContext<'_>,
  units: &[BuildUnit],
) -> Result<Vec<AssembledUnit>, AssembleError> {
  let mut assembled = Vec::with_capacity(units.len());
  for (i, unit) in units.iter().enumerate() {
    info!(unit = %unit.name, progress = %format!("{}/{}", i + 1, units.len()), "assembling");
    assembled.push(assemble_unit(ctx, unit).await?);
  }
  Ok(assembled)
}

/// Check that regional staging holds exactly `expected`.
pub fn verify_archive_set(layout: &StagingLayout, expected: &BTreeSet<String>) -> Result<(), AssembleError> {
  let staged = layout.staged_archives()?;
  let missing: Vec<String> = expected.difference(&staged).cloned().collect();
  let unexpected: Vec<String> = staged.difference(expected).cloned().collect();

  if missing.is_empty() && unexpected.is_empty() {
    Ok(())
  } else {
    Err(AssembleError::ArchiveSetMismatch { missing, unexpected })
  }
}

//! Dependency bundles.
//!
//! Third-party packages are vendored into an empty support directory, that
//! directory becomes the archive's base, and the unit's sources are appended
//! after it.

use std::fs;

use tracing::{debug, info};

use super::{AssembleContext, AssembleError, AssembledUnit, UnitOrigin, archive_err};
use crate::archive::Archive;
use crate::manifest::BuildUnit;
use crate::venv::{EnvError, InstallSpec, Installer};

pub async fn assemble(ctx: &AssembleContext<'_>, unit: &BuildUnit) -> Result<AssembledUnit, AssembleError> {
  let dest = ctx.layout.archive_path(&unit.archive);

  if ctx.reused.contains(&unit.archive) && dest.is_file() {
    let archive = Archive::open(&dest).map_err(archive_err(unit))?;
    info!(archive = %unit.archive, entries = archive.entries().len(), "reusing archive from previous run");
    return Ok(AssembledUnit {
      name: unit.name.clone(),
      kind: unit.kind,
      archive: dest,
      origin: UnitOrigin::Reused,
      template: None,
    });
  }

  let scratch = ctx.env.scratch_dir(&unit.name)?;
  let package_dir = scratch.join("package");
  fs::create_dir_all(&package_dir).map_err(|source| EnvError::Scratch {
    path: package_dir.clone(),
    source,
  })?;

  let spec = InstallSpec {
    packages: unit.dependencies.clone(),
    requirements: unit.requirements.as_deref().map(|r| ctx.resolve(r)),
  };
  if spec.is_empty() {
    debug!("no dependencies declared");
  } else {
    let installer = Installer::resolve(ctx.env.tool_env())?;
    installer
      .install(&spec, Some(&package_dir), &scratch, ctx.env.tool_env())
      .await?;
  }

  let base = ctx
    .builder
    .create_base(&package_dir, &dest)
    .map_err(archive_err(unit))?;
  let archive = ctx
    .builder
    .append_entries(base, &ctx.sources(unit))
    .map_err(archive_err(unit))?;

  Ok(AssembledUnit {
    name: unit.name.clone(),
    kind: unit.kind,
    archive: archive.path().to_path_buf(),
    origin: UnitOrigin::Built,
    template: None,
  })
}

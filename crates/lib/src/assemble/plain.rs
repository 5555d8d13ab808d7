//! Plain archives: the unit's own sources and nothing else.

use super::{AssembleContext, AssembleError, AssembledUnit, UnitOrigin, archive_err};
use crate::manifest::BuildUnit;

pub fn assemble(ctx: &AssembleContext<'_>, unit: &BuildUnit) -> Result<AssembledUnit, AssembleError> {
  let dest = ctx.layout.archive_path(&unit.archive);
  let archive = ctx
    .builder
    .from_sources(&ctx.sources(unit), &dest)
    .map_err(archive_err(unit))?;

  Ok(AssembledUnit {
    name: unit.name.clone(),
    kind: unit.kind,
    archive: archive.path().to_path_buf(),
    origin: UnitOrigin::Built,
    template: None,
  })
}

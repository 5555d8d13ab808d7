//! Framework-packaged units.
//!
//! The two API services are packaged by an external framework that merges a
//! resource-override document with the service code and emits both a
//! deployable archive and a template fragment. Both outputs are required by
//! the main template, so any failure here is fatal.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::{AssembleContext, AssembleError, AssembledUnit, UnitOrigin};
use crate::exec::{ExecError, run_tool};
use crate::manifest::BuildUnit;

/// Archive the framework writes into its output directory.
pub const FRAMEWORK_ARCHIVE: &str = "deployment.zip";

/// Template fragment the framework writes into its output directory.
pub const FRAMEWORK_TEMPLATE: &str = "sam.json";

#[derive(Debug, Error)]
pub enum DelegateBuildError {
  #[error("packaging framework '{0}' not found in the build environment")]
  NotFound(String),

  #[error("packaging '{unit}' failed: {source}")]
  Failed {
    unit: String,
    #[source]
    source: ExecError,
  },

  #[error("unit '{unit}' does not declare '{field}'")]
  MissingField { unit: String, field: &'static str },

  #[error("packaging '{unit}' did not produce {path}")]
  MissingOutput { unit: String, path: PathBuf },

  #[error("failed to stage output of '{unit}': {source}")]
  Stage {
    unit: String,
    #[source]
    source: io::Error,
  },
}

pub async fn assemble(ctx: &AssembleContext<'_>, unit: &BuildUnit) -> Result<AssembledUnit, AssembleError> {
  let command = &ctx.framework.command;
  let program = ctx
    .env
    .tool_env()
    .resolve(command)
    .ok_or_else(|| DelegateBuildError::NotFound(command.clone()))?;

  let project_dir = ctx.resolve(&unit.sources[0]);
  let override_doc = unit
    .override_document
    .as_deref()
    .map(|p| ctx.resolve(p))
    .ok_or_else(|| DelegateBuildError::MissingField {
      unit: unit.name.clone(),
      field: "override_document",
    })?;
  let template_name = unit.template.as_deref().ok_or_else(|| DelegateBuildError::MissingField {
    unit: unit.name.clone(),
    field: "template",
  })?;
  let out_dir = ctx.env.scratch_dir(&format!("{}-dist", unit.name))?;

  run_tool(
    &program,
    [
      OsStr::new("package"),
      OsStr::new("--merge-template"),
      override_doc.as_os_str(),
      out_dir.as_os_str(),
    ],
    &project_dir,
    ctx.env.tool_env(),
  )
  .await
  .map_err(|source| DelegateBuildError::Failed {
    unit: unit.name.clone(),
    source,
  })?;

  let archive = ctx.layout.archive_path(&unit.archive);
  let template = ctx.layout.template_path(template_name);
  stage_output(unit, &out_dir.join(FRAMEWORK_ARCHIVE), &archive)?;
  stage_output(unit, &out_dir.join(FRAMEWORK_TEMPLATE), &template)?;

  info!(template = %template_name, "framework template fragment staged");

  Ok(AssembledUnit {
    name: unit.name.clone(),
    kind: unit.kind,
    archive,
    origin: UnitOrigin::Built,
    template: Some(template),
  })
}

fn stage_output(unit: &BuildUnit, from: &Path, to: &Path) -> Result<(), DelegateBuildError> {
  if !from.is_file() {
    return Err(DelegateBuildError::MissingOutput {
      unit: unit.name.clone(),
      path: from.to_path_buf(),
    });
  }
  fs::copy(from, to).map_err(|source| DelegateBuildError::Stage {
    unit: unit.name.clone(),
    source,
  })?;
  Ok(())
}

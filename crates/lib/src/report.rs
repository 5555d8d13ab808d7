//! Run summary and the template URL marker.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::assemble::{AssembledUnit, LayerOutcome, LayerSource, UnitOrigin};
use crate::consts::SOLUTION_PREFIX;
use crate::params::RunParameters;
use crate::publish::PublishReport;
use crate::staging::StagingLayout;
use crate::template::RenderedTemplate;
use crate::util::hash::{ContentHash, hash_file};

#[derive(Debug, Error)]
pub enum ReportError {
  #[error("failed to write {path}: {source}")]
  WriteMarker {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to inspect archive {path}: {source}")]
  Inspect {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Public HTTPS URL of the main template once published.
pub fn template_url(params: &RunParameters, main_template: &str) -> String {
  format!(
    "https://{}.s3.{}.amazonaws.com/{}/{}/{}",
    params.template_bucket, params.region, SOLUTION_PREFIX, params.version, main_template
  )
}

/// Write `url` as the single line of the staging marker file.
pub fn write_marker(layout: &StagingLayout, url: &str) -> Result<PathBuf, ReportError> {
  fs::write(&layout.marker, format!("{}\n", url)).map_err(|source| ReportError::WriteMarker {
    path: layout.marker.clone(),
    source,
  })?;
  info!(path = %layout.marker.display(), "template URL recorded");
  Ok(layout.marker.clone())
}

/// One staged archive.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
  pub name: String,
  /// Owning unit, or `None` for layer archives.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unit: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub origin: Option<UnitOrigin>,
  pub size: u64,
  pub sha256: ContentHash,
}

impl ArchiveSummary {
  fn inspect(path: &Path, unit: Option<&AssembledUnit>) -> Result<Self, ReportError> {
    let inspect_err = |source| ReportError::Inspect {
      path: path.to_path_buf(),
      source,
    };
    let size = fs::metadata(path).map_err(inspect_err)?.len();
    let sha256 = hash_file(path).map_err(inspect_err)?;
    Ok(Self {
      name: path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default(),
      unit: unit.map(|u| u.name.clone()),
      origin: unit.map(|u| u.origin),
      size,
      sha256,
    })
  }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub template_url: String,
  pub parameters: RunParameters,
  pub staging: PathBuf,
  pub archives: Vec<ArchiveSummary>,
  pub templates: Vec<RenderedTemplate>,
  pub layers: LayerSource,
  pub publish: PublishReport,
}

impl RunReport {
  pub fn new(
    template_url: String,
    params: &RunParameters,
    layout: &StagingLayout,
    units: &[AssembledUnit],
    layers: &LayerOutcome,
    templates: Vec<RenderedTemplate>,
    publish: PublishReport,
  ) -> Result<Self, ReportError> {
    let mut archives = units
      .iter()
      .map(|unit| ArchiveSummary::inspect(&unit.archive, Some(unit)))
      .collect::<Result<Vec<_>, _>>()?;
    for layer in &layers.archives {
      archives.push(ArchiveSummary::inspect(layer, None)?);
    }

    Ok(Self {
      template_url,
      parameters: params.clone(),
      staging: layout.root.clone(),
      archives,
      templates,
      layers: layers.source,
      publish,
    })
  }

  pub fn total_archive_bytes(&self) -> u64 {
    self.archives.iter().map(|a| a.size).sum()
  }
}

//! Build manifest loading and validation.
//!
//! The built-in manifest describes the media-insights solution and is
//! compiled into the binary; `--manifest` swaps in another file with the same
//! schema.

mod types;

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use types::*;

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

const BUILTIN_MANIFEST: &str = include_str!("default.json");

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse manifest: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("unsupported manifest version {0}, expected {MANIFEST_VERSION}")]
  UnsupportedVersion(u32),

  #[error("unit '{0}' is declared more than once")]
  DuplicateUnit(String),

  #[error("archive name '{0}' is produced more than once")]
  DuplicateArchive(String),

  #[error("archive name '{0}' must be a plain file name ending in .zip")]
  BadArchiveName(String),

  #[error("unit '{0}' has no sources")]
  NoSources(String),

  #[error("framework-packaged unit '{unit}' is missing '{field}'")]
  MissingFrameworkField { unit: String, field: &'static str },

  #[error("main template '{0}' is not produced by any template or framework unit")]
  UnknownMainTemplate(String),

  #[error("template destination '{0}' is produced more than once")]
  DuplicateTemplate(String),

  #[error("layer specification declares no runtimes")]
  NoLayerRuntimes,
}

impl Manifest {
  /// The manifest compiled into the binary.
  pub fn builtin() -> Result<Self, ManifestError> {
    Self::parse(BUILTIN_MANIFEST)
  }

  /// Load and validate a manifest file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loaded manifest");
    Self::parse(&content)
  }

  /// Parse and validate manifest JSON.
  pub fn parse(content: &str) -> Result<Self, ManifestError> {
    let manifest: Manifest = serde_json::from_str(content).map_err(ManifestError::Parse)?;
    manifest.validate()?;
    Ok(manifest)
  }

  /// Check the structural invariants every build relies on.
  pub fn validate(&self) -> Result<(), ManifestError> {
    if self.version != MANIFEST_VERSION {
      return Err(ManifestError::UnsupportedVersion(self.version));
    }

    let mut names = HashSet::new();
    let mut archives = HashSet::new();

    for unit in &self.units {
      if !names.insert(unit.name.as_str()) {
        return Err(ManifestError::DuplicateUnit(unit.name.clone()));
      }
      if unit.sources.is_empty() {
        return Err(ManifestError::NoSources(unit.name.clone()));
      }
      check_archive_name(&unit.archive)?;
      if !archives.insert(unit.archive.clone()) {
        return Err(ManifestError::DuplicateArchive(unit.archive.clone()));
      }

      if unit.kind == UnitKind::FrameworkPackaged {
        if unit.override_document.is_none() {
          return Err(ManifestError::MissingFrameworkField {
            unit: unit.name.clone(),
            field: "override_document",
          });
        }
        if unit.template.is_none() {
          return Err(ManifestError::MissingFrameworkField {
            unit: unit.name.clone(),
            field: "template",
          });
        }
      }
    }

    if let Some(layers) = &self.layers {
      if layers.runtimes.is_empty() {
        return Err(ManifestError::NoLayerRuntimes);
      }
      for runtime in &layers.runtimes {
        let name = layers.archive_name(runtime);
        check_archive_name(&name)?;
        if !archives.insert(name.clone()) {
          return Err(ManifestError::DuplicateArchive(name));
        }
      }
    }

    let mut destinations = HashSet::new();
    for name in self.template_destinations() {
      if !destinations.insert(name) {
        return Err(ManifestError::DuplicateTemplate(name.to_string()));
      }
    }
    if !destinations.contains(self.main_template.as_str()) {
      return Err(ManifestError::UnknownMainTemplate(self.main_template.clone()));
    }

    Ok(())
  }

  /// Every template name staged in the global directory: declared documents
  /// first, then framework fragments.
  pub fn template_destinations(&self) -> impl Iterator<Item = &str> {
    self.templates.iter().map(|t| t.destination.as_str()).chain(
      self
        .units
        .iter()
        .filter(|u| u.kind == UnitKind::FrameworkPackaged)
        .filter_map(|u| u.template.as_deref()),
    )
  }

  /// Units of one kind, in declaration order.
  pub fn units_of_kind(&self, kind: UnitKind) -> impl Iterator<Item = &BuildUnit> {
    self.units.iter().filter(move |u| u.kind == kind)
  }

  /// Layer archive names, empty when the manifest declares no layers.
  pub fn layer_archives(&self) -> Vec<String> {
    self
      .layers
      .as_ref()
      .map(|l| l.runtimes.iter().map(|r| l.archive_name(r)).collect())
      .unwrap_or_default()
  }

  /// The exact archive set a successful build leaves in regional staging.
  pub fn expected_archives(&self, include_layers: bool) -> BTreeSet<String> {
    let mut set: BTreeSet<String> = self.units.iter().map(|u| u.archive.clone()).collect();
    if include_layers {
      set.extend(self.layer_archives());
    }
    set
  }
}

fn check_archive_name(name: &str) -> Result<(), ManifestError> {
  let plain = !name.is_empty() && !name.contains('/') && !name.contains('\\') && name != ".zip";
  if plain && name.ends_with(".zip") {
    Ok(())
  } else {
    Err(ManifestError::BadArchiveName(name.to_string()))
  }
}

//! Manifest types for miepack.
//!
//! The manifest is the static description of everything a build produces:
//! the units to archive, the templates to render, the runtime layers, and the
//! tooling installed into the ephemeral environment.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "main_template": "media-insights-stack.template",
//!   "units": [
//!     {
//!       "name": "mediainfo",
//!       "group": "mediainfo",
//!       "kind": "dependency-bundle",
//!       "sources": ["source/operators/mediainfo/mediainfo.py"],
//!       "dependencies": ["pymediainfo==4.2.1"],
//!       "archive": "mediainfo.zip"
//!     }
//!   ],
//!   "templates": [
//!     { "source": "deployment/media-insights-stack.yaml", "destination": "media-insights-stack.template" }
//!   ]
//! }
//! ```
//!
//! All paths are relative to the repository root.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a unit's archive is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
  /// Source files only.
  PlainZip,
  /// Vendored third-party dependencies first, then the unit's sources.
  DependencyBundle,
  /// Delegated to the packaging framework, which also emits a template.
  FrameworkPackaged,
}

impl UnitKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      UnitKind::PlainZip => "plain-zip",
      UnitKind::DependencyBundle => "dependency-bundle",
      UnitKind::FrameworkPackaged => "framework-packaged",
    }
  }
}

impl std::fmt::Display for UnitKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One logical deployable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildUnit {
  pub name: String,

  /// Capability the unit belongs to. Only used for reporting.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub group: Option<String>,

  pub kind: UnitKind,

  /// Files or directories archived as the unit's own code. For
  /// framework-packaged units the first entry is the project directory the
  /// framework runs in.
  pub sources: Vec<PathBuf>,

  /// Packages vendored into a dependency bundle.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<String>,

  /// Requirements file vendored into a dependency bundle.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub requirements: Option<PathBuf>,

  /// Archive file name in the regional staging directory.
  pub archive: String,

  /// Resource-override document merged by the packaging framework.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub override_document: Option<PathBuf>,

  /// Name under which the framework's template fragment is staged.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template: Option<String>,
}

/// A template document copied into staging and parameterized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
  pub source: PathBuf,
  pub destination: String,
}

/// The runtime-keyed shared dependency layers.
///
/// `archive`, `build_output` and `fallback_url` are patterns: `{runtime}` is
/// replaced by each entry of `runtimes`, and `{region}` by the run's region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
  pub runtimes: Vec<String>,
  pub archive: String,
  pub factory_dir: PathBuf,
  pub factory_script: String,
  pub requirements: String,
  pub build_output: String,
  pub fallback_url: String,
}

impl LayerSpec {
  /// Staged archive name for `runtime`.
  pub fn archive_name(&self, runtime: &str) -> String {
    self.archive.replace("{runtime}", runtime)
  }

  /// File the factory script leaves behind for `runtime`.
  pub fn build_output_name(&self, runtime: &str) -> String {
    self.build_output.replace("{runtime}", runtime)
  }

  /// Pre-built download location for `runtime` in `region`.
  pub fn fallback_url(&self, region: &str, runtime: &str) -> String {
    self
      .fallback_url
      .replace("{region}", region)
      .replace("{runtime}", runtime)
  }
}

/// Tooling installed into the ephemeral environment before assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
  #[serde(default)]
  pub packages: Vec<String>,
}

/// The external packaging framework used by framework-packaged units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkSpec {
  pub command: String,
}

impl Default for FrameworkSpec {
  fn default() -> Self {
    Self {
      command: "chalice".to_string(),
    }
  }
}

/// The complete build description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
  /// Manifest format version.
  pub version: u32,

  /// Destination name of the template deployers launch.
  pub main_template: String,

  pub units: Vec<BuildUnit>,

  pub templates: Vec<TemplateSpec>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub layers: Option<LayerSpec>,

  #[serde(default)]
  pub environment: EnvironmentSpec,

  #[serde(default)]
  pub framework: FrameworkSpec,
}

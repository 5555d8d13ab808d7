//! Run parameters and their validation.
//!
//! Parameters are validated once, before anything touches the filesystem, and
//! are immutable for the rest of the run. Version and bucket names are opaque:
//! they are embedded verbatim into remote paths and templates.

use serde::Serialize;
use thiserror::Error;

use crate::consts::SUPPORTED_REGIONS;

/// How archives and templates reach the object store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
  /// One bulk sync per staging directory.
  #[default]
  Sync,
  /// One upload call per file.
  Copy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
  #[error("missing required parameter {0}")]
  Missing(&'static str),

  #[error("region '{0}' is not supported (run `miepack regions` for the list)")]
  UnsupportedRegion(String),
}

/// Raw, possibly incomplete parameters as they arrive from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
  pub template_bucket: Option<String>,
  pub code_bucket: Option<String>,
  pub version: Option<String>,
  pub region: Option<String>,
  pub verbose: bool,
  pub no_layer: bool,
  pub upload_mode: UploadMode,
  pub profile: Option<String>,
  pub reuse_archives: bool,
}

/// Validated parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunParameters {
  pub template_bucket: String,
  pub code_bucket: String,
  pub version: String,
  pub region: String,
  pub verbose: bool,
  pub build_layers: bool,
  pub upload_mode: UploadMode,
  pub profile: Option<String>,
  pub reuse_archives: bool,
}

impl RunParameters {
  /// Validate raw arguments.
  ///
  /// Required parameters are checked in command-line order so the first
  /// missing flag is the one reported.
  pub fn from_args(args: RunArgs) -> Result<Self, ParamsError> {
    let template_bucket = required(args.template_bucket, "--template-bucket")?;
    let code_bucket = required(args.code_bucket, "--code-bucket")?;
    let version = required(args.version, "--version")?;
    let region = required(args.region, "--region")?;

    if !is_supported_region(&region) {
      return Err(ParamsError::UnsupportedRegion(region));
    }

    Ok(Self {
      template_bucket,
      code_bucket,
      version,
      region,
      verbose: args.verbose,
      build_layers: !args.no_layer,
      upload_mode: args.upload_mode,
      profile: args.profile.filter(|p| !p.is_empty()),
      reuse_archives: args.reuse_archives,
    })
  }

  /// Bucket receiving code archives: the code bucket suffixed with the region.
  pub fn regional_bucket(&self) -> String {
    format!("{}-{}", self.code_bucket, self.region)
  }
}

fn required(value: Option<String>, flag: &'static str) -> Result<String, ParamsError> {
  match value {
    Some(v) if !v.trim().is_empty() => Ok(v),
    _ => Err(ParamsError::Missing(flag)),
  }
}

/// Case-sensitive membership in the supported region list.
pub fn is_supported_region(region: &str) -> bool {
  SUPPORTED_REGIONS.contains(&region)
}

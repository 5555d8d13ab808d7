//! Runtime-keyed Lambda layers.
//!
//! Layers are produced by the first strategy that succeeds:
//!
//! 1. [`LayerStrategy::LocalContainerBuild`] runs the layer factory script,
//!    which needs a container tool on PATH.
//! 2. [`LayerStrategy::PrebuiltDownload`] fetches published archives keyed by
//!    region and runtime.
//!
//! A failed strategy is logged as a warning and the next one is tried. The
//! build only fails when every strategy has failed.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::download::{DownloadError, download};
use crate::exec::{ExecError, ToolEnv, run_tool};
use crate::manifest::LayerSpec;
use crate::staging::StagingLayout;

/// Container tool the layer factory drives.
pub const CONTAINER_TOOL: &str = "docker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerStrategy {
  LocalContainerBuild,
  PrebuiltDownload,
}

impl LayerStrategy {
  pub const DEFAULT_ORDER: [LayerStrategy; 2] = [LayerStrategy::LocalContainerBuild, LayerStrategy::PrebuiltDownload];

  fn source(self) -> LayerSource {
    match self {
      LayerStrategy::LocalContainerBuild => LayerSource::BuiltLocally,
      LayerStrategy::PrebuiltDownload => LayerSource::Downloaded,
    }
  }
}

impl fmt::Display for LayerStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LayerStrategy::LocalContainerBuild => f.write_str("local container build"),
      LayerStrategy::PrebuiltDownload => f.write_str("pre-built download"),
    }
  }
}

/// Where the staged layer archives came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerSource {
  BuiltLocally,
  Downloaded,
  Skipped,
}

impl fmt::Display for LayerSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LayerSource::BuiltLocally => f.write_str("built locally"),
      LayerSource::Downloaded => f.write_str("downloaded"),
      LayerSource::Skipped => f.write_str("skipped"),
    }
  }
}

/// Why one strategy did not produce the layers.
#[derive(Debug, Error)]
pub enum LayerFailure {
  #[error("container tool '{0}' not found on PATH")]
  ContainerToolMissing(&'static str),

  #[error("layer factory script not found at {0}")]
  FactoryMissing(PathBuf),

  #[error("layer factory failed: {0}")]
  FactoryFailed(#[source] ExecError),

  #[error("layer factory did not produce {0}")]
  MissingOutput(PathBuf),

  #[error(transparent)]
  Download(#[from] DownloadError),

  #[error("failed to stage {path}: {source}")]
  Stage {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Error)]
pub enum LayerError {
  #[error("no layer strategy succeeded: {}", describe_failures(.0))]
  Exhausted(Vec<(LayerStrategy, LayerFailure)>),
}

fn describe_failures(failures: &[(LayerStrategy, LayerFailure)]) -> String {
  failures
    .iter()
    .map(|(strategy, failure)| format!("{}: {}", strategy, failure))
    .collect::<Vec<_>>()
    .join("; ")
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerOutcome {
  pub source: LayerSource,
  pub archives: Vec<PathBuf>,
}

impl LayerOutcome {
  pub fn skipped() -> Self {
    Self {
      source: LayerSource::Skipped,
      archives: Vec::new(),
    }
  }
}

pub struct LayerBuilder<'a> {
  spec: &'a LayerSpec,
  repo_root: &'a Path,
  layout: &'a StagingLayout,
  env: &'a ToolEnv,
  region: &'a str,
  strategies: Vec<LayerStrategy>,
  client: reqwest::Client,
}

impl<'a> LayerBuilder<'a> {
  pub fn new(
    spec: &'a LayerSpec,
    repo_root: &'a Path,
    layout: &'a StagingLayout,
    env: &'a ToolEnv,
    region: &'a str,
  ) -> Self {
    Self {
      spec,
      repo_root,
      layout,
      env,
      region,
      strategies: LayerStrategy::DEFAULT_ORDER.to_vec(),
      client: reqwest::Client::new(),
    }
  }

  pub fn with_strategies(mut self, strategies: &[LayerStrategy]) -> Self {
    self.strategies = strategies.to_vec();
    self
  }

  /// Stage every runtime's layer archive.
  pub async fn build(&self) -> Result<LayerOutcome, LayerError> {
    let mut failures = Vec::new();

    for &strategy in &self.strategies {
      info!(strategy = %strategy, "building layers");
      let result = match strategy {
        LayerStrategy::LocalContainerBuild => self.build_locally().await,
        LayerStrategy::PrebuiltDownload => self.download_prebuilt().await,
      };

      match result {
        Ok(archives) => {
          info!(strategy = %strategy, count = archives.len(), "layers staged");
          return Ok(LayerOutcome {
            source: strategy.source(),
            archives,
          });
        }
        Err(failure) => {
          warn!(strategy = %strategy, reason = %failure, "layer strategy failed");
          failures.push((strategy, failure));
        }
      }
    }

    Err(LayerError::Exhausted(failures))
  }

  async fn build_locally(&self) -> Result<Vec<PathBuf>, LayerFailure> {
    if self.env.resolve(CONTAINER_TOOL).is_none() {
      return Err(LayerFailure::ContainerToolMissing(CONTAINER_TOOL));
    }

    let factory_dir = self.repo_root.join(&self.spec.factory_dir);
    let script = factory_dir.join(&self.spec.factory_script);
    if !script.is_file() {
      return Err(LayerFailure::FactoryMissing(script));
    }

    run_tool(&script, [&self.spec.requirements], &factory_dir, self.env)
      .await
      .map_err(LayerFailure::FactoryFailed)?;

    let mut staged = Vec::with_capacity(self.spec.runtimes.len());
    for runtime in &self.spec.runtimes {
      let output = factory_dir.join(self.spec.build_output_name(runtime));
      if !output.is_file() {
        return Err(LayerFailure::MissingOutput(output));
      }
      let dest = self.layout.archive_path(&self.spec.archive_name(runtime));
      fs::copy(&output, &dest).map_err(|source| LayerFailure::Stage {
        path: dest.clone(),
        source,
      })?;
      let _ = fs::remove_file(&output);
      staged.push(dest);
    }
    Ok(staged)
  }

  async fn download_prebuilt(&self) -> Result<Vec<PathBuf>, LayerFailure> {
    let mut staged = Vec::with_capacity(self.spec.runtimes.len());
    for runtime in &self.spec.runtimes {
      let url = self.spec.fallback_url(self.region, runtime);
      let dest = self.layout.archive_path(&self.spec.archive_name(runtime));
      download(&self.client, &url, &dest).await?;
      staged.push(dest);
    }
    Ok(staged)
  }
}

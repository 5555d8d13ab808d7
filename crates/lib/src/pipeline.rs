//! Build orchestration.
//!
//! [`build`] runs the phases of a packaging run strictly in order:
//!
//! 1. Preflight: refuse nested environments, resolve required tools
//! 2. Lock and reset the staging tree
//! 3. Create the ephemeral environment and install the build tooling
//! 4. Assemble every unit, then the layers
//! 5. Parameterize templates
//! 6. Publish
//! 7. Tear down the environment and write the template URL marker
//!
//! Any failure stops the run. The environment is owned by this function, so
//! it is removed on every exit path, including when the future is dropped by
//! [`build_until_interrupted`].

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::archive::ArchiveBuilder;
use crate::assemble::{
  AssembleContext, AssembleError, LayerBuilder, LayerError, LayerOutcome, LayerStrategy, assemble_units,
  verify_archive_set,
};
use crate::consts::{APP_NAME, VIRTUAL_ENV_VAR};
use crate::exec::ToolEnv;
use crate::manifest::{Manifest, ManifestError, UnitKind};
use crate::params::RunParameters;
use crate::preflight::{PreflightError, ToolRequirement, check_not_nested, check_tools};
use crate::publish::{AwsCli, Backend, LocalStore, PublishError, publish};
use crate::report::{ReportError, RunReport, template_url, write_marker};
use crate::staging::{LockError, StagingError, StagingLayout, StagingLock};
use crate::template::{TemplateError, TokenMap, parameterize, render_in_place};
use crate::venv::{DependencyInstallError, EnvError, EphemeralEnv, InstallSpec};

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Preflight(#[from] PreflightError),

  #[error("repository root {path} is not accessible: {source}")]
  RepoRoot {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error(transparent)]
  Staging(#[from] StagingError),

  #[error(transparent)]
  Env(#[from] EnvError),

  #[error("failed to install build tooling: {0}")]
  Install(#[from] DependencyInstallError),

  #[error(transparent)]
  Assemble(#[from] AssembleError),

  #[error(transparent)]
  Layer(#[from] LayerError),

  #[error(transparent)]
  Template(#[from] TemplateError),

  #[error(transparent)]
  Publish(#[from] PublishError),

  #[error(transparent)]
  Report(#[from] ReportError),

  #[error("interrupted by {0}")]
  Interrupted(&'static str),
}

/// Where a build reads from and writes to.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  pub repo_root: PathBuf,
  /// Staging root; relative paths are taken from the repository root.
  pub staging_dir: PathBuf,
  /// Alternative manifest; the built-in one otherwise.
  pub manifest: Option<PathBuf>,
  /// Mirror uploads here instead of calling the AWS CLI.
  pub local_store: Option<PathBuf>,
  /// Parent of the ephemeral environment; the system temp dir otherwise.
  pub env_parent: Option<PathBuf>,
  pub layer_strategies: Vec<LayerStrategy>,
}

impl BuildOptions {
  pub fn new(repo_root: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
    Self {
      repo_root: repo_root.into(),
      staging_dir: staging_dir.into(),
      manifest: None,
      local_store: None,
      env_parent: None,
      layer_strategies: LayerStrategy::DEFAULT_ORDER.to_vec(),
    }
  }
}

/// Resolved inputs of one run. All paths are absolute.
#[derive(Debug)]
pub struct BuildContext {
  pub repo_root: PathBuf,
  pub layout: StagingLayout,
  pub manifest: Manifest,
  pub params: RunParameters,
  pub base_env: ToolEnv,
  pub python: PathBuf,
  pub store: Backend,
  pub env_parent: Option<PathBuf>,
  pub layer_strategies: Vec<LayerStrategy>,
}

impl BuildContext {
  /// Run every check that must pass before the filesystem is touched.
  pub fn prepare(params: RunParameters, options: &BuildOptions, base_env: ToolEnv) -> Result<Self, PipelineError> {
    let virtual_env = base_env.lookup(VIRTUAL_ENV_VAR);
    check_not_nested(virtual_env.as_deref().and_then(|v| v.to_str()))?;

    let mut requirements = vec![ToolRequirement::python()];
    if options.local_store.is_none() {
      requirements.push(ToolRequirement::uploader());
    }
    let tools = check_tools(&requirements, &base_env)?;
    let python = tools
      .get(ToolRequirement::python().capability)
      .map(Path::to_path_buf)
      .ok_or_else(|| missing(&ToolRequirement::python()))?;

    let repo_root = dunce::canonicalize(&options.repo_root).map_err(|source| PipelineError::RepoRoot {
      path: options.repo_root.clone(),
      source,
    })?;

    let manifest = match &options.manifest {
      Some(path) => Manifest::load(&repo_root.join(path))?,
      None => Manifest::builtin()?,
    };

    let store = match &options.local_store {
      Some(dir) => Backend::Local(LocalStore::new(repo_root.join(dir))),
      None => {
        let aws = tools
          .get(ToolRequirement::uploader().capability)
          .map(Path::to_path_buf)
          .ok_or_else(|| missing(&ToolRequirement::uploader()))?;
        Backend::Aws(AwsCli::new(aws, params.profile.clone(), base_env.clone(), repo_root.clone()))
      }
    };

    let layout = StagingLayout::in_repo(&repo_root, &options.staging_dir)?;

    Ok(Self {
      layout,
      repo_root,
      manifest,
      params,
      base_env,
      python,
      store,
      env_parent: options.env_parent.clone(),
      layer_strategies: options.layer_strategies.clone(),
    })
  }

  /// Bundle archives a `--reuse-archives` run may keep.
  fn reusable_archives(&self) -> BTreeSet<String> {
    if !self.params.reuse_archives {
      return BTreeSet::new();
    }
    self
      .manifest
      .units_of_kind(UnitKind::DependencyBundle)
      .map(|u| u.archive.clone())
      .collect()
  }
}

fn missing(req: &ToolRequirement) -> PipelineError {
  PipelineError::Preflight(PreflightError::MissingTool {
    capability: req.capability,
    aliases: req.aliases.join(", "),
  })
}

/// Run a prepared build to completion.
pub async fn build(ctx: &BuildContext) -> Result<RunReport, PipelineError> {
  info!(
    version = %ctx.params.version,
    region = %ctx.params.region,
    units = ctx.manifest.units.len(),
    layers = ctx.params.build_layers,
    "starting build"
  );

  let _lock = StagingLock::acquire(&ctx.layout.root, &format!("{} build", APP_NAME))?;
  let reused = ctx.layout.reset(&ctx.reusable_archives())?;

  let env = match &ctx.env_parent {
    Some(parent) => EphemeralEnv::create_in(parent, &ctx.python, &ctx.base_env).await?,
    None => EphemeralEnv::create(&ctx.python, &ctx.base_env).await?,
  };
  info!(path = %env.root().display(), "ephemeral environment ready");

  env
    .install(&InstallSpec::packages(&ctx.manifest.environment.packages))
    .instrument(info_span!("phase", name = "provision"))
    .await?;

  let assemble_ctx = AssembleContext {
    repo_root: &ctx.repo_root,
    layout: &ctx.layout,
    env: &env,
    framework: &ctx.manifest.framework,
    reused: &reused,
    builder: ArchiveBuilder::new(),
  };
  let units = assemble_units(&assemble_ctx, &ctx.manifest.units)
    .instrument(info_span!("phase", name = "assemble"))
    .await?;

  let layers = match (&ctx.manifest.layers, ctx.params.build_layers) {
    (Some(spec), true) => {
      LayerBuilder::new(spec, &ctx.repo_root, &ctx.layout, env.tool_env(), &ctx.params.region)
        .with_strategies(&ctx.layer_strategies)
        .build()
        .instrument(info_span!("phase", name = "layers"))
        .await?
    }
    (Some(_), false) => {
      info!("layer build disabled");
      LayerOutcome::skipped()
    }
    (None, _) => LayerOutcome::skipped(),
  };

  verify_archive_set(&ctx.layout, &ctx.manifest.expected_archives(ctx.params.build_layers))?;

  let tokens = TokenMap::from_params(&ctx.params);
  let mut templates = parameterize(&ctx.manifest.templates, &ctx.repo_root, &ctx.layout.global_dir, &tokens)?;
  for fragment in units.iter().filter_map(|u| u.template.as_deref()) {
    templates.push(render_in_place(fragment, &tokens)?);
  }
  debug!(count = templates.len(), "templates parameterized");

  let published = publish(&ctx.store, &ctx.layout, &ctx.params)
    .instrument(info_span!("phase", name = "publish"))
    .await?;

  env.close();

  let url = template_url(&ctx.params, &ctx.manifest.main_template);
  write_marker(&ctx.layout, &url)?;

  let report = RunReport::new(url, &ctx.params, &ctx.layout, &units, &layers, templates, published)?;
  info!(
    archives = report.archives.len(),
    bytes = report.total_archive_bytes(),
    url = %report.template_url,
    "build complete"
  );
  Ok(report)
}

/// [`build`], abandoned on SIGINT or SIGTERM.
///
/// Dropping the build future kills the in-flight tool and removes the
/// ephemeral environment before this returns.
pub async fn build_until_interrupted(ctx: &BuildContext) -> Result<RunReport, PipelineError> {
  tokio::select! {
    result = build(ctx) => result,
    signal = shutdown_signal() => {
      warn!(signal, "build interrupted, cleaning up");
      Err(PipelineError::Interrupted(signal))
    }
  }
}

/// Resolves with the name of the first termination signal received.
#[cfg(unix)]
pub async fn shutdown_signal() -> &'static str {
  use tokio::signal::unix::{SignalKind, signal};

  match signal(SignalKind::terminate()) {
    Ok(mut term) => tokio::select! {
      _ = tokio::signal::ctrl_c() => "SIGINT",
      _ = term.recv() => "SIGTERM",
    },
    Err(e) => {
      warn!(error = %e, "cannot listen for SIGTERM");
      let _ = tokio::signal::ctrl_c().await;
      "SIGINT"
    }
  }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> &'static str {
  let _ = tokio::signal::ctrl_c().await;
  "SIGINT"
}

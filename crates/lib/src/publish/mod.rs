//! Publishing staged artifacts to the object store.
//!
//! Templates go to the template bucket and archives to the region-suffixed
//! code bucket, both under `media_insights_engine/<version>/`. Template
//! backups are never uploaded. The first failed upload aborts the step.

mod aws;
mod local;

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::consts::{SOLUTION_PREFIX, TEMPLATE_BACKUP_SUFFIX};
use crate::exec::ExecError;
use crate::params::{RunParameters, UploadMode};
use crate::staging::StagingLayout;

pub use aws::AwsCli;
pub use local::LocalStore;

#[derive(Debug, Error)]
pub enum PublishError {
  #[error("upload to {dest} failed: {source}")]
  Upload {
    dest: String,
    #[source]
    source: ExecError,
  },

  #[error("failed to publish {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A bucket and key (or key prefix ending in `/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectUri {
  pub bucket: String,
  pub key: String,
}

impl ObjectUri {
  pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
    Self {
      bucket: bucket.into(),
      key: key.into(),
    }
  }

  /// `self` as a prefix with `name` appended.
  pub fn child(&self, name: &str) -> Self {
    Self::new(self.bucket.clone(), format!("{}{}", self.key, name))
  }
}

impl fmt::Display for ObjectUri {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "s3://{}/{}", self.bucket, self.key)
  }
}

/// The remote side of a publish.
pub trait ObjectStore {
  /// Upload one file to `dest`.
  fn put_object(&self, local: &Path, dest: &ObjectUri) -> impl Future<Output = Result<(), PublishError>> + Send;

  /// Mirror the files under `local` below the prefix `dest`, skipping names
  /// that match any of `excludes` (`*suffix` or an exact name).
  fn sync_dir(
    &self,
    local: &Path,
    dest: &ObjectUri,
    excludes: &[&str],
  ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// The store chosen for a run.
#[derive(Debug)]
pub enum Backend {
  Aws(AwsCli),
  Local(LocalStore),
}

impl ObjectStore for Backend {
  async fn put_object(&self, local: &Path, dest: &ObjectUri) -> Result<(), PublishError> {
    match self {
      Backend::Aws(store) => store.put_object(local, dest).await,
      Backend::Local(store) => store.put_object(local, dest).await,
    }
  }

  async fn sync_dir(&self, local: &Path, dest: &ObjectUri, excludes: &[&str]) -> Result<(), PublishError> {
    match self {
      Backend::Aws(store) => store.sync_dir(local, dest, excludes).await,
      Backend::Local(store) => store.sync_dir(local, dest, excludes).await,
    }
  }
}

/// What a publish uploaded.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
  pub mode: UploadMode,
  pub template_prefix: String,
  pub code_prefix: String,
  pub uploaded: Vec<String>,
}

/// Versioned destination prefix for templates.
pub fn template_prefix(params: &RunParameters) -> ObjectUri {
  ObjectUri::new(&params.template_bucket, format!("{}/{}/", SOLUTION_PREFIX, params.version))
}

/// Versioned destination prefix for archives.
pub fn code_prefix(params: &RunParameters) -> ObjectUri {
  ObjectUri::new(params.regional_bucket(), format!("{}/{}/", SOLUTION_PREFIX, params.version))
}

pub(crate) fn is_excluded(name: &str, excludes: &[&str]) -> bool {
  excludes.iter().any(|pattern| match pattern.strip_prefix('*') {
    Some(suffix) => name.ends_with(suffix),
    None => name == *pattern,
  })
}

/// Publishable files directly in `dir`, sorted by name.
fn publishable_files(dir: &Path, excludes: &[&str]) -> Result<Vec<(String, PathBuf)>, PublishError> {
  let io_err = |source| PublishError::Io {
    path: dir.to_path_buf(),
    source,
  };
  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir).map_err(io_err)? {
    let entry = entry.map_err(io_err)?;
    let name = entry.file_name().to_string_lossy().into_owned();
    if entry.path().is_file() && !is_excluded(&name, excludes) {
      files.push((name, entry.path()));
    }
  }
  files.sort();
  Ok(files)
}

/// Upload the global and regional staging directories.
pub async fn publish<S: ObjectStore>(
  store: &S,
  layout: &StagingLayout,
  params: &RunParameters,
) -> Result<PublishReport, PublishError> {
  let backup_pattern = format!("*{}", TEMPLATE_BACKUP_SUFFIX);
  let excludes = [backup_pattern.as_str()];
  let targets = [
    (&layout.global_dir, template_prefix(params)),
    (&layout.regional_dir, code_prefix(params)),
  ];

  let mut uploaded = Vec::new();
  for (dir, prefix) in &targets {
    let files = publishable_files(dir, &excludes)?;
    info!(dir = %dir.display(), dest = %prefix, files = files.len(), mode = ?params.upload_mode, "publishing");

    match params.upload_mode {
      UploadMode::Sync => {
        store.sync_dir(dir, prefix, &excludes).await?;
        uploaded.extend(files.iter().map(|(name, _)| prefix.child(name).to_string()));
      }
      UploadMode::Copy => {
        for (name, path) in &files {
          let dest = prefix.child(name);
          store.put_object(path, &dest).await?;
          uploaded.push(dest.to_string());
        }
      }
    }
  }

  let [(_, template), (_, code)] = targets;
  Ok(PublishReport {
    mode: params.upload_mode,
    template_prefix: template.to_string(),
    code_prefix: code.to_string(),
    uploaded,
  })
}

//! Object store mirrored onto a local directory.
//!
//! `s3://bucket/key` maps to `<root>/bucket/key`. Useful for offline builds
//! and for inspecting exactly what a publish would upload.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::{ObjectStore, ObjectUri, PublishError, is_excluded};

#[derive(Debug, Clone)]
pub struct LocalStore {
  root: PathBuf,
}

impl LocalStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn target(&self, uri: &ObjectUri) -> PathBuf {
    let mut path = self.root.join(&uri.bucket);
    for part in uri.key.split('/').filter(|p| !p.is_empty()) {
      path.push(part);
    }
    path
  }

  fn copy(&self, local: &Path, dest: &ObjectUri) -> Result<(), PublishError> {
    let target = self.target(dest);
    let io_err = |source| PublishError::Io {
      path: target.clone(),
      source,
    };
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::copy(local, &target).map_err(io_err)?;
    debug!(from = %local.display(), to = %target.display(), "mirrored object");
    Ok(())
  }
}

impl ObjectStore for LocalStore {
  async fn put_object(&self, local: &Path, dest: &ObjectUri) -> Result<(), PublishError> {
    self.copy(local, dest)
  }

  async fn sync_dir(&self, local: &Path, dest: &ObjectUri, excludes: &[&str]) -> Result<(), PublishError> {
    for entry in WalkDir::new(local).sort_by_file_name() {
      let entry = entry.map_err(|e| PublishError::Io {
        path: local.to_path_buf(),
        source: e.into(),
      })?;
      if !entry.file_type().is_file() {
        continue;
      }
      let name = entry.file_name().to_string_lossy();
      if is_excluded(&name, excludes) {
        continue;
      }
      let Ok(relative) = entry.path().strip_prefix(local) else {
        continue;
      };
      let key = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
      self.copy(entry.path(), &dest.child(&key))?;
    }
    Ok(())
  }
}

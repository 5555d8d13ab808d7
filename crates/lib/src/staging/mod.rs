//! Local staging tree.
//!
//! ```text
//! <root>/
//! ├── global-s3-assets/      # templates and framework template fragments
//! ├── regional-s3-assets/    # unit and layer archives
//! └── template_url.txt       # marker read by downstream automation
//! ```

pub mod lock;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{GLOBAL_ASSETS_DIR, REGIONAL_ASSETS_DIR, TEMPLATE_URL_FILENAME};

pub use lock::{LockError, StagingLock};

#[derive(Debug, Error)]
pub enum StagingError {
  #[error("failed to prepare staging directory {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("staging directory {staging} contains the repository root {repo_root}; pick a directory inside the repository")]
  EnclosesRepository { staging: PathBuf, repo_root: PathBuf },
}

fn staging_err(path: &Path) -> impl FnOnce(io::Error) -> StagingError + '_ {
  move |source| StagingError::Io {
    path: path.to_path_buf(),
    source,
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
  pub root: PathBuf,
  pub global_dir: PathBuf,
  pub regional_dir: PathBuf,
  pub marker: PathBuf,
}

impl StagingLayout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      global_dir: root.join(GLOBAL_ASSETS_DIR),
      regional_dir: root.join(REGIONAL_ASSETS_DIR),
      marker: root.join(TEMPLATE_URL_FILENAME),
      root,
    }
  }

  /// Layout for `staging_dir` resolved against `repo_root`.
  ///
  /// Resetting such a root clears its asset directories, so a root that is
  /// the repository itself or one of its ancestors is refused.
  pub fn in_repo(repo_root: &Path, staging_dir: &Path) -> Result<Self, StagingError> {
    let root = normalize(&repo_root.join(staging_dir));
    if repo_root.starts_with(&root) {
      return Err(StagingError::EnclosesRepository {
        staging: root,
        repo_root: repo_root.to_path_buf(),
      });
    }
    Ok(Self::new(root))
  }

  /// Clear the previous run's output and recreate the asset directories.
  ///
  /// Only the two asset directories and the marker are touched; anything else
  /// under the root is left alone. Regional archives named in `keep` survive.
  /// Returns the names that were kept.
  pub fn reset(&self, keep: &BTreeSet<String>) -> Result<BTreeSet<String>, StagingError> {
    let mut kept = BTreeSet::new();

    if self.regional_dir.is_dir() && !keep.is_empty() {
      kept = self.prune_regional(keep)?;
    } else {
      remove_if_present(&self.regional_dir)?;
    }
    remove_if_present(&self.global_dir)?;
    remove_if_present(&self.marker)?;

    fs::create_dir_all(&self.global_dir).map_err(staging_err(&self.global_dir))?;
    fs::create_dir_all(&self.regional_dir).map_err(staging_err(&self.regional_dir))?;

    info!(path = %self.root.display(), kept = kept.len(), "staging directory ready");
    Ok(kept)
  }

  fn prune_regional(&self, keep: &BTreeSet<String>) -> Result<BTreeSet<String>, StagingError> {
    let mut kept = BTreeSet::new();
    for entry in fs::read_dir(&self.regional_dir).map_err(staging_err(&self.regional_dir))? {
      let entry = entry.map_err(staging_err(&self.regional_dir))?;
      let path = entry.path();
      let name = entry.file_name().to_string_lossy().into_owned();
      if path.is_file() && keep.contains(&name) {
        debug!(archive = %name, "keeping archive from previous run");
        kept.insert(name);
      } else {
        remove_path(&path)?;
      }
    }
    Ok(kept)
  }

  /// Path of `name` in the regional directory.
  pub fn archive_path(&self, name: &str) -> PathBuf {
    self.regional_dir.join(name)
  }

  /// Path of `name` in the global directory.
  pub fn template_path(&self, name: &str) -> PathBuf {
    self.global_dir.join(name)
  }

  /// File names currently in the regional directory, sorted.
  pub fn staged_archives(&self) -> Result<BTreeSet<String>, StagingError> {
    list_files(&self.regional_dir)
  }
}

fn list_files(dir: &Path) -> Result<BTreeSet<String>, StagingError> {
  let mut names = BTreeSet::new();
  for entry in fs::read_dir(dir).map_err(staging_err(dir))? {
    let entry = entry.map_err(staging_err(dir))?;
    if entry.path().is_file() {
      names.insert(entry.file_name().to_string_lossy().into_owned());
    }
  }
  Ok(names)
}

/// Lexically resolve `.` and `..`; the path may not exist yet.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}

fn remove_if_present(path: &Path) -> Result<(), StagingError> {
  if fs::symlink_metadata(path).is_err() {
    return Ok(());
  }
  remove_path(path)
}

fn remove_path(path: &Path) -> Result<(), StagingError> {
  let result = if path.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  };
  result.map_err(staging_err(path))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn reset_creates_layout() {
    let temp = TempDir::new().unwrap();
    let layout = StagingLayout::new(temp.path().join("dist"));

    layout.reset(&BTreeSet::new()).unwrap();

    assert!(layout.global_dir.is_dir());
    assert!(layout.regional_dir.is_dir());
    assert!(!layout.marker.exists());
    assert_eq!(layout.marker, temp.path().join("dist/template_url.txt"));
  }

  #[test]
  fn reset_wipes_previous_run() {
    let temp = TempDir::new().unwrap();
    let layout = StagingLayout::new(temp.path().join("dist"));
    layout.reset(&BTreeSet::new()).unwrap();
    fs::write(layout.archive_path("old.zip"), "x").unwrap();
    fs::write(layout.template_path("old.template"), "x").unwrap();
    fs::write(&layout.marker, "https://old\n").unwrap();

    layout.reset(&BTreeSet::new()).unwrap();

    assert!(layout.staged_archives().unwrap().is_empty());
    assert!(fs::read_dir(&layout.global_dir).unwrap().next().is_none());
    assert!(!layout.marker.exists());
  }

  #[test]
  fn reset_leaves_unmanaged_siblings_alone() {
    let temp = TempDir::new().unwrap();
    // Staging straight into `deployment/`, next to the template sources.
    let layout = StagingLayout::new(temp.path().join("deployment"));
    fs::create_dir_all(layout.root.join("helper")).unwrap();
    fs::write(layout.root.join("media-insights-stack.yaml"), "Resources: {}\n").unwrap();
    fs::write(layout.root.join("helper/build.sh"), "#!/bin/sh\n").unwrap();
    layout.reset(&BTreeSet::new()).unwrap();
    fs::write(layout.archive_path("old.zip"), "x").unwrap();
    fs::write(&layout.marker, "https://old\n").unwrap();

    layout.reset(&BTreeSet::new()).unwrap();

    assert_eq!(
      fs::read_to_string(layout.root.join("media-insights-stack.yaml")).unwrap(),
      "Resources: {}\n"
    );
    assert!(layout.root.join("helper/build.sh").is_file());
    assert!(layout.staged_archives().unwrap().is_empty());
    assert!(!layout.marker.exists());
  }

  #[test]
  fn in_repo_refuses_repository_root_and_ancestors() {
    let repo = Path::new("/work/mie");

    for dir in [".", "", "..", "deployment/../..", "/work"] {
      let err = StagingLayout::in_repo(repo, Path::new(dir)).unwrap_err();
      assert!(matches!(err, StagingError::EnclosesRepository { .. }), "{dir:?} accepted");
    }
  }

  #[test]
  fn in_repo_accepts_nested_directories() {
    let repo = Path::new("/work/mie");

    let layout = StagingLayout::in_repo(repo, Path::new("./deployment/dist")).unwrap();
    assert_eq!(layout.root, Path::new("/work/mie/deployment/dist"));

    let layout = StagingLayout::in_repo(repo, Path::new("deployment")).unwrap();
    assert_eq!(layout.global_dir, Path::new("/work/mie/deployment/global-s3-assets"));

    let layout = StagingLayout::in_repo(repo, Path::new("/tmp/mie-dist")).unwrap();
    assert_eq!(layout.root, Path::new("/tmp/mie-dist"));
  }

  #[test]
  fn reset_keeps_only_requested_archives() {
    let temp = TempDir::new().unwrap();
    let layout = StagingLayout::new(temp.path().join("dist"));
    layout.reset(&BTreeSet::new()).unwrap();
    fs::write(layout.archive_path("mediainfo.zip"), "cached").unwrap();
    fs::write(layout.archive_path("operator_failed.zip"), "stale").unwrap();
    fs::write(layout.template_path("stack.template"), "x").unwrap();

    let kept = layout.reset(&names(&["mediainfo.zip", "get_captions.zip"])).unwrap();

    assert_eq!(kept, names(&["mediainfo.zip"]));
    assert_eq!(layout.staged_archives().unwrap(), names(&["mediainfo.zip"]));
    assert_eq!(fs::read_to_string(layout.archive_path("mediainfo.zip")).unwrap(), "cached");
    assert!(!layout.template_path("stack.template").exists());
  }
}

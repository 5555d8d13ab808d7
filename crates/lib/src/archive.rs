//! Two-stage archive builder.
//!
//! Dependency bundles are written in two passes: [`ArchiveBuilder::create_base`]
//! archives a directory of vendored dependencies, then
//! [`ArchiveBuilder::append_entries`] reopens the same file and adds the unit's
//! own sources after them. Appending never rewrites entries already in the
//! archive and never replaces one: a name collision is an error.
//!
//! # Entry naming
//!
//! - A source file contributes one entry named after the file.
//! - A source directory contributes every file below it, prefixed with the
//!   directory's own name (`lib/metrics.py`).
//! - A base directory contributes its contents relative to itself.
//!
//! Entries are written in sorted order with a fixed 1980-01-01 timestamp, so
//! identical inputs produce byte-identical archives.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("archive source does not exist: {0}")]
  MissingSource(PathBuf),

  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("zip error on {path}: {source}")]
  Zip {
    path: PathBuf,
    #[source]
    source: ZipError,
  },

  #[error("entry '{entry}' already exists in {archive}")]
  DuplicateEntry { archive: PathBuf, entry: String },
}

impl ArchiveError {
  fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
    move |source| ArchiveError::Io {
      path: path.to_path_buf(),
      source,
    }
  }

  fn zip(path: &Path) -> impl FnOnce(ZipError) -> Self + '_ {
    move |source| ArchiveError::Zip {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// A zip file on disk and the entry names written to it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
  path: PathBuf,
  entries: Vec<String>,
}

impl Archive {
  /// Open an existing archive and read its entry names.
  pub fn open(path: &Path) -> Result<Self, ArchiveError> {
    Ok(Self {
      path: path.to_path_buf(),
      entries: read_entries(path)?,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn entries(&self) -> &[String] {
    &self.entries
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.iter().any(|e| e == name)
  }
}

/// Writes archives with a fixed compression method.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveBuilder {
  compression: CompressionMethod,
}

impl Default for ArchiveBuilder {
  fn default() -> Self {
    Self {
      compression: CompressionMethod::Deflated,
    }
  }
}

impl ArchiveBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create `dest` from the contents of `dep_dir`.
  pub fn create_base(&self, dep_dir: &Path, dest: &Path) -> Result<Archive, ArchiveError> {
    if !dep_dir.is_dir() {
      return Err(ArchiveError::MissingSource(dep_dir.to_path_buf()));
    }
    let entries = dir_entries(dep_dir, None)?;
    self.write_new(dest, entries)
  }

  /// Create `dest` from source files and directories only.
  pub fn from_sources(&self, sources: &[PathBuf], dest: &Path) -> Result<Archive, ArchiveError> {
    let entries = source_entries(sources, dest)?;
    self.write_new(dest, entries)
  }

  /// Add `sources` to the end of an existing archive.
  ///
  /// Entries already present are left untouched. If any new entry name
  /// collides with an existing one the archive is not modified.
  pub fn append_entries(&self, archive: Archive, sources: &[PathBuf]) -> Result<Archive, ArchiveError> {
    let path = archive.path;
    let existing: BTreeSet<String> = read_entries(&path)?.into_iter().collect();
    let new_entries = source_entries(sources, &path)?;

    if let Some((name, _)) = new_entries.iter().find(|(name, _)| existing.contains(name)) {
      return Err(ArchiveError::DuplicateEntry {
        archive: path,
        entry: name.clone(),
      });
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .open(&path)
      .map_err(ArchiveError::io(&path))?;
    let mut writer = ZipWriter::new_append(file).map_err(ArchiveError::zip(&path))?;

    let mut entries = archive.entries;
    for (name, source) in new_entries {
      self.write_entry(&mut writer, &path, &name, &source)?;
      entries.push(name);
    }
    writer.finish().map_err(ArchiveError::zip(&path))?;

    debug!(archive = %path.display(), entries = entries.len(), "appended entries");
    Ok(Archive { path, entries })
  }

  fn write_new(&self, dest: &Path, entries: Vec<(String, PathBuf)>) -> Result<Archive, ArchiveError> {
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(ArchiveError::io(parent))?;
    }
    let file = File::create(dest).map_err(ArchiveError::io(dest))?;
    let mut writer = ZipWriter::new(file);

    let mut names = Vec::with_capacity(entries.len());
    for (name, source) in entries {
      self.write_entry(&mut writer, dest, &name, &source)?;
      names.push(name);
    }
    writer.finish().map_err(ArchiveError::zip(dest))?;

    debug!(archive = %dest.display(), entries = names.len(), "wrote archive");
    Ok(Archive {
      path: dest.to_path_buf(),
      entries: names,
    })
  }

  fn write_entry(
    &self,
    writer: &mut ZipWriter<File>,
    archive: &Path,
    name: &str,
    source: &Path,
  ) -> Result<(), ArchiveError> {
    let mut options = SimpleFileOptions::default()
      .compression_method(self.compression)
      .last_modified_time(DateTime::default());

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let mode = fs::metadata(source).map_err(ArchiveError::io(source))?.permissions().mode();
      options = options.unix_permissions(mode & 0o777);
    }

    writer
      .start_file(name, options)
      .map_err(ArchiveError::zip(archive))?;
    let mut input = File::open(source).map_err(ArchiveError::io(source))?;
    io::copy(&mut input, writer).map_err(ArchiveError::io(source))?;
    Ok(())
  }
}

/// Entry names of the archive at `path`, in central-directory order.
pub fn read_entries(path: &Path) -> Result<Vec<String>, ArchiveError> {
  let file = File::open(path).map_err(ArchiveError::io(path))?;
  let mut archive = ZipArchive::new(BufReader::new(file)).map_err(ArchiveError::zip(path))?;

  let mut names = Vec::with_capacity(archive.len());
  for i in 0..archive.len() {
    let entry = archive.by_index(i).map_err(ArchiveError::zip(path))?;
    names.push(entry.name().to_string());
  }
  Ok(names)
}

/// Files below `dir`, named relative to it and optionally prefixed.
fn dir_entries(dir: &Path, prefix: Option<&str>) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
  let mut entries = Vec::new();

  for entry in WalkDir::new(dir).follow_links(true) {
    let entry = entry.map_err(|e| ArchiveError::Io {
      path: dir.to_path_buf(),
      source: e.into(),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let Ok(relative) = entry.path().strip_prefix(dir) else {
      continue;
    };
    let mut name = relative
      .components()
      .map(|c| c.as_os_str().to_string_lossy().into_owned())
      .collect::<Vec<_>>()
      .join("/");
    if let Some(prefix) = prefix {
      name = format!("{}/{}", prefix, name);
    }
    entries.push((name, entry.path().to_path_buf()));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));
  Ok(entries)
}

/// Entries for a list of source files and directories.
fn source_entries(sources: &[PathBuf], archive: &Path) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
  let mut entries = Vec::new();

  for source in sources {
    let name = source
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .ok_or_else(|| ArchiveError::MissingSource(source.clone()))?;

    if source.is_dir() {
      entries.extend(dir_entries(source, Some(&name))?);
    } else if source.is_file() {
      entries.push((name, source.clone()));
    } else {
      return Err(ArchiveError::MissingSource(source.clone()));
    }
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));
  if let Some(pair) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
    return Err(ArchiveError::DuplicateEntry {
      archive: archive.to_path_buf(),
      entry: pair[0].0.clone(),
    });
  }
  Ok(entries)
}

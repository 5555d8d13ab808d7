//! Template parameterization.
//!
//! Templates carry literal placeholder tokens that are replaced with run
//! parameters before publishing. Replacement is plain text substitution: no
//! escaping, no validation of the values, and a token anywhere in a document
//! is replaced, including inside strings that were never meant as
//! placeholders.
//!
//! # Tokens
//!
//! | Token                      | Value              |
//! |----------------------------|--------------------|
//! | `%%TEMPLATE_BUCKET_NAME%%` | template bucket    |
//! | `%%BUCKET_NAME%%`          | code bucket        |
//! | `%%VERSION%%`              | version string     |
//! | `%%REGION%%`               | target region      |
//!
//! # Example
//!
//! ```
//! use miepack_lib::template::{TokenMap, residual_tokens, substitute};
//!
//! let tokens = TokenMap::new([("%%VERSION%%", "v2.0.0".to_string())]);
//! let out = substitute("CodeKey: media_insights_engine/%%VERSION%%/op.zip", &tokens);
//! assert_eq!(out, "CodeKey: media_insights_engine/v2.0.0/op.zip");
//! assert!(residual_tokens(&out, &tokens).is_empty());
//! ```

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::TEMPLATE_BACKUP_SUFFIX;
use crate::manifest::TemplateSpec;
use crate::params::RunParameters;

pub const TEMPLATE_BUCKET_TOKEN: &str = "%%TEMPLATE_BUCKET_NAME%%";
pub const CODE_BUCKET_TOKEN: &str = "%%BUCKET_NAME%%";
pub const VERSION_TOKEN: &str = "%%VERSION%%";
pub const REGION_TOKEN: &str = "%%REGION%%";

#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("failed to read template {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write template {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("template {path} still contains {}", .tokens.join(", "))]
  Residual { path: PathBuf, tokens: Vec<String> },
}

/// Declared tokens and their replacement values, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMap {
  entries: Vec<(&'static str, String)>,
}

impl TokenMap {
  pub fn new(entries: impl IntoIterator<Item = (&'static str, String)>) -> Self {
    Self {
      entries: entries.into_iter().collect(),
    }
  }

  /// The full token set for a run.
  pub fn from_params(params: &RunParameters) -> Self {
    Self::new([
      (TEMPLATE_BUCKET_TOKEN, params.template_bucket.clone()),
      (CODE_BUCKET_TOKEN, params.code_bucket.clone()),
      (VERSION_TOKEN, params.version.clone()),
      (REGION_TOKEN, params.region.clone()),
    ])
  }

  pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
    self.entries.iter().map(|(token, value)| (*token, value.as_str()))
  }
}

/// A template written to staging.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedTemplate {
  pub path: PathBuf,
  pub backup: PathBuf,
  pub replacements: usize,
}

/// Replace every occurrence of every token.
pub fn substitute(document: &str, tokens: &TokenMap) -> String {
  let mut out = document.to_string();
  for (token, value) in tokens.iter() {
    out = out.replace(token, value);
  }
  out
}

/// Declared tokens still present in `document`.
pub fn residual_tokens<'a>(document: &str, tokens: &'a TokenMap) -> Vec<&'a str> {
  tokens
    .entries
    .iter()
    .map(|(token, _)| *token)
    .filter(|token| document.contains(token))
    .collect()
}

fn count_tokens(document: &str, tokens: &TokenMap) -> usize {
  tokens.iter().map(|(token, _)| document.matches(token).count()).sum()
}

/// `<path>.orig`
pub fn backup_path(path: &Path) -> PathBuf {
  let mut name = OsString::from(path.as_os_str());
  name.push(TEMPLATE_BACKUP_SUFFIX);
  PathBuf::from(name)
}

/// Copy every declared template into `global_dir` and parameterize it.
pub fn parameterize(
  templates: &[TemplateSpec],
  repo_root: &Path,
  global_dir: &Path,
  tokens: &TokenMap,
) -> Result<Vec<RenderedTemplate>, TemplateError> {
  templates
    .iter()
    .map(|spec| {
      let source = repo_root.join(&spec.source);
      let original = fs::read_to_string(&source).map_err(|e| TemplateError::Read {
        path: source.clone(),
        source: e,
      })?;
      render(&original, &global_dir.join(&spec.destination), tokens)
    })
    .collect()
}

/// Parameterize a template already in staging, such as a framework fragment.
pub fn render_in_place(path: &Path, tokens: &TokenMap) -> Result<RenderedTemplate, TemplateError> {
  let original = fs::read_to_string(path).map_err(|source| TemplateError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  render(&original, path, tokens)
}

fn render(original: &str, dest: &Path, tokens: &TokenMap) -> Result<RenderedTemplate, TemplateError> {
  let rendered = substitute(original, tokens);

  let residual = residual_tokens(&rendered, tokens);
  if !residual.is_empty() {
    return Err(TemplateError::Residual {
      path: dest.to_path_buf(),
      tokens: residual.into_iter().map(String::from).collect(),
    });
  }

  let backup = backup_path(dest);
  write(&backup, original)?;
  write(dest, &rendered)?;

  let replacements = count_tokens(original, tokens);
  debug!(path = %dest.display(), replacements, "template rendered");
  info!(template = %dest.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(), "template parameterized");

  Ok(RenderedTemplate {
    path: dest.to_path_buf(),
    backup,
    replacements,
  })
}

fn write(path: &Path, content: &str) -> Result<(), TemplateError> {
  fs::write(path, content).map_err(|source| TemplateError::Write {
    path: path.to_path_buf(),
    source,
  })
}

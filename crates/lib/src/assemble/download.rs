//! HTTP download of pre-built artifacts.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::util::hash::hash_bytes;

#[derive(Debug, Error)]
pub enum DownloadError {
  #[error("fetching {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("fetching {url} returned HTTP {status}")]
  Status { url: String, status: reqwest::StatusCode },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Download `url` to `dest`.
///
/// The body is written to a sibling `.part` file and renamed into place, so
/// `dest` either holds the complete download or does not exist.
///
/// # Returns
///
/// The number of bytes written.
pub async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64, DownloadError> {
  info!(url = %url, "downloading");
  let request_err = |source| DownloadError::Request {
    url: url.to_string(),
    source,
  };

  let response = client.get(url).send().await.map_err(request_err)?;
  if !response.status().is_success() {
    return Err(DownloadError::Status {
      url: url.to_string(),
      status: response.status(),
    });
  }
  let bytes = response.bytes().await.map_err(request_err)?;

  let part = dest.with_extension("zip.part");
  let write = async {
    let mut file = fs::File::create(&part).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    fs::rename(&part, dest).await
  };
  if let Err(source) = write.await {
    let _ = fs::remove_file(&part).await;
    return Err(DownloadError::Write {
      path: dest.to_path_buf(),
      source,
    });
  }

  debug!(path = %dest.display(), sha256 = %hash_bytes(&bytes).0, "download digest");
  info!(path = %dest.display(), size = bytes.len(), "download complete");

  Ok(bytes.len() as u64)
}

//! Object store backed by the AWS command line.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ObjectStore, ObjectUri, PublishError};
use crate::exec::{ToolEnv, run_tool};

#[derive(Debug, Clone)]
pub struct AwsCli {
  program: PathBuf,
  profile: Option<String>,
  env: ToolEnv,
  cwd: PathBuf,
}

impl AwsCli {
  /// `program` is the resolved `aws` executable; `cwd` is where it runs.
  pub fn new(program: PathBuf, profile: Option<String>, env: ToolEnv, cwd: PathBuf) -> Self {
    Self {
      program,
      profile,
      env,
      cwd,
    }
  }

  async fn run(&self, mut args: Vec<OsString>, dest: &ObjectUri) -> Result<(), PublishError> {
    if let Some(profile) = &self.profile {
      args.push("--profile".into());
      args.push(profile.into());
    }
    let output = run_tool(&self.program, &args, &self.cwd, &self.env)
      .await
      .map_err(|source| PublishError::Upload {
        dest: dest.to_string(),
        source,
      })?;
    debug!(dest = %dest, transferred = transfer_count(&output.stdout), "upload finished");
    Ok(())
  }
}

/// Objects the CLI reports as written (`upload: <src> to <dest>` lines).
fn transfer_count(stdout: &str) -> usize {
  stdout.lines().filter(|line| line.starts_with("upload:")).count()
}

impl ObjectStore for AwsCli {
  async fn put_object(&self, local: &Path, dest: &ObjectUri) -> Result<(), PublishError> {
    let args: Vec<OsString> = vec![
      "s3".into(),
      "cp".into(),
      local.as_os_str().to_os_string(),
      dest.to_string().into(),
    ];
    self.run(args, dest).await
  }

  async fn sync_dir(&self, local: &Path, dest: &ObjectUri, excludes: &[&str]) -> Result<(), PublishError> {
    let mut args: Vec<OsString> = vec![
      "s3".into(),
      "sync".into(),
      local.as_os_str().to_os_string(),
      dest.to_string().into(),
    ];
    for pattern in excludes {
      args.push("--exclude".into());
      args.push(pattern.into());
    }
    self.run(args, dest).await
  }
}

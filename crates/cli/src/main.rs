mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use miepack_lib::params::{RunArgs, UploadMode};

use crate::output::{OutputFormat, format_error_chain, print_error};

/// miepack - package and publish the Media Insights Engine
#[derive(Parser)]
#[command(name = "miepack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build, parameterize and publish every artifact
  Build(BuildArgs),

  /// Run a pytest suite in a throwaway environment
  #[command(subcommand)]
  Test(TestCommand),

  /// List the regions a build can target
  Regions,
}

#[derive(Args)]
pub struct BuildArgs {
  /// Bucket receiving the templates
  #[arg(long, value_name = "NAME")]
  template_bucket: Option<String>,

  /// Bucket prefix receiving the archives; the region is appended
  #[arg(long, value_name = "NAME")]
  code_bucket: Option<String>,

  /// Version string embedded in remote paths and templates
  #[arg(long, value_name = "STRING")]
  version: Option<String>,

  /// Target region
  #[arg(long, value_name = "REGION")]
  region: Option<String>,

  /// Skip the Lambda layer build
  #[arg(long)]
  no_layer: bool,

  /// How staged files are uploaded
  #[arg(long, value_enum, default_value_t = UploadModeArg::Sync)]
  upload_mode: UploadModeArg,

  /// AWS CLI profile for uploads
  #[arg(long, value_name = "NAME")]
  profile: Option<String>,

  /// Keep dependency bundle archives from the previous run
  #[arg(long)]
  reuse_archives: bool,

  /// Repository root
  #[arg(long, env = "MIEPACK_REPO_ROOT", default_value = ".")]
  repo_root: PathBuf,

  /// Staging directory, relative to the repository root
  #[arg(long, env = "MIEPACK_STAGING_DIR", default_value = "deployment/dist")]
  staging_dir: PathBuf,

  /// Build manifest to use instead of the built-in one
  #[arg(long, value_name = "FILE")]
  manifest: Option<PathBuf>,

  /// Mirror uploads into this directory instead of S3
  #[arg(long, value_name = "DIR")]
  local_store: Option<PathBuf>,
}

impl BuildArgs {
  fn run_args(&self, verbose: bool) -> RunArgs {
    RunArgs {
      template_bucket: self.template_bucket.clone(),
      code_bucket: self.code_bucket.clone(),
      version: self.version.clone(),
      region: self.region.clone(),
      verbose,
      no_layer: self.no_layer,
      upload_mode: self.upload_mode.into(),
      profile: self.profile.clone(),
      reuse_archives: self.reuse_archives,
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UploadModeArg {
  Sync,
  Copy,
}

impl From<UploadModeArg> for UploadMode {
  fn from(mode: UploadModeArg) -> Self {
    match mode {
      UploadModeArg::Sync => UploadMode::Sync,
      UploadModeArg::Copy => UploadMode::Copy,
    }
  }
}

#[derive(Subcommand)]
pub enum TestCommand {
  /// Unit tests, optionally for one component
  Unit {
    component: Option<String>,
    #[arg(long, env = "MIEPACK_REPO_ROOT", default_value = ".")]
    repo_root: PathBuf,
  },

  /// Integration tests against a deployed stack
  Integ {
    component: Option<String>,
    #[arg(long, env = "MIEPACK_REPO_ROOT", default_value = ".")]
    repo_root: PathBuf,
  },

  /// End-to-end tests against a deployed stack
  E2e {
    #[arg(long, env = "MIEPACK_REPO_ROOT", default_value = ".")]
    repo_root: PathBuf,
  },
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(e) => {
      let _ = e.print();
      return match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
      };
    }
  };

  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build(args) => cmd::cmd_build(&args, cli.verbose, cli.output),
    Commands::Test(test) => cmd::cmd_test(test),
    Commands::Regions => cmd::cmd_regions(cli.output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format_error_chain(&e));
      ExitCode::FAILURE
    }
  }
}

//! Implementation of the `miepack build` command.
//!
//! Validates the run parameters, then hands a prepared [`BuildContext`] to the
//! pipeline and prints the resulting template URL.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use miepack_lib::assemble::LayerSource;
use miepack_lib::exec::ToolEnv;
use miepack_lib::params::RunParameters;
use miepack_lib::pipeline::{BuildContext, BuildOptions, build_until_interrupted};
use miepack_lib::report::RunReport;

use crate::BuildArgs;
use crate::output::{
  OutputFormat, format_bytes, format_duration, print_archive, print_info, print_json, print_stat, print_success,
  print_warning,
};

pub fn cmd_build(args: &BuildArgs, verbose: bool, format: OutputFormat) -> Result<()> {
  let params = RunParameters::from_args(args.run_args(verbose))?;

  let options = BuildOptions {
    manifest: args.manifest.clone(),
    local_store: args.local_store.clone(),
    ..BuildOptions::new(&args.repo_root, &args.staging_dir)
  };
  let ctx = BuildContext::prepare(params, &options, ToolEnv::from_process())?;
  debug!(repo = %ctx.repo_root.display(), staging = %ctx.layout.root.display(), "build prepared");

  if !format.is_json() {
    print_info(&format!(
      "Building {} for {} ({} units)",
      ctx.params.version,
      ctx.params.region,
      ctx.manifest.units.len()
    ));
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let report = rt.block_on(build_until_interrupted(&ctx)).context("Build failed")?;

  if format.is_json() {
    print_json(&report)?;
  } else {
    print_summary(&report, started.elapsed(), verbose);
  }
  Ok(())
}

fn print_summary(report: &RunReport, elapsed: std::time::Duration, verbose: bool) {
  print_success(&format!("Build complete in {}", format_duration(elapsed)));
  print_stat("Archives", &report.archives.len().to_string());
  print_stat("Size", &format_bytes(report.total_archive_bytes()));
  print_stat("Templates", &report.templates.len().to_string());
  print_stat("Layers", &report.layers.to_string());
  print_stat("Uploaded", &report.publish.uploaded.len().to_string());

  if verbose {
    println!();
    for archive in &report.archives {
      print_archive(&archive.name, &archive.sha256.0, archive.size);
    }
  }
  if report.layers == LayerSource::Downloaded {
    print_warning("layers were downloaded prebuilt; the local container build did not succeed");
  }

  println!();
  println!("{}", report.template_url);
}

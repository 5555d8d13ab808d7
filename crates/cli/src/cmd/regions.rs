use anyhow::Result;

use miepack_lib::consts::SUPPORTED_REGIONS;

use crate::output::{OutputFormat, print_json};

pub fn cmd_regions(format: OutputFormat) -> Result<()> {
  if format.is_json() {
    return print_json(&SUPPORTED_REGIONS);
  }
  for region in SUPPORTED_REGIONS {
    println!("{}", region);
  }
  Ok(())
}

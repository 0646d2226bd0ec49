//! Implementation of the `gostd pack` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use gostd_lib::archive::{ArchiveEntry, package_entries};

use crate::output::{Status, print_status};

#[derive(Args, Debug)]
pub struct PackArgs {
  /// Archive to write
  out: PathBuf,

  /// Files to store, as name=path
  #[arg(required = true)]
  entries: Vec<String>,
}

pub fn cmd_pack(args: PackArgs) -> Result<()> {
  let entries = args
    .entries
    .iter()
    .map(|entry| entry.parse::<ArchiveEntry>())
    .collect::<Result<Vec<_>, _>>()?;

  package_entries(&args.out, &entries).with_context(|| format!("Failed to package {}", args.out.display()))?;

  print_status(Status::Success, &format!("Packed {} file(s) into {}", entries.len(), args.out.display()));
  Ok(())
}

//! Implementation of the `gostd stdlib` command.
//!
//! Runs inside the standard library build action: stages the SDK into the
//! output directory and compiles the requested packages there.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use gostd_lib::builder::{StdlibArgs, stdlib};
use gostd_lib::env::{Env, EnvConfig};

/// Flags shared by every builder verb that runs Go tools.
#[derive(Args, Debug)]
pub struct EnvFlags {
  /// Path to the Go SDK for the host platform
  #[arg(long)]
  sdk: Option<PathBuf>,

  /// Go SDK packaged as a zip archive
  #[arg(long)]
  sdkzip: Option<PathBuf>,

  /// Comma-separated build tags
  #[arg(long, value_delimiter = ',')]
  tags: Vec<String>,

  /// Directory under GOROOT/pkg with the archives to build against
  #[arg(long, default_value = "")]
  installsuffix: String,

  /// Keep the scratch directory instead of deleting it
  #[arg(long)]
  work: bool,
}

impl EnvFlags {
  fn into_config(self, verbose: bool) -> EnvConfig {
    EnvConfig {
      sdk: self.sdk,
      sdk_zip: self.sdkzip,
      tags: self.tags,
      install_suffix: self.installsuffix,
      verbose,
      preserve_work_dir: self.work,
    }
  }
}

#[derive(Args, Debug)]
pub struct StdlibCmdArgs {
  #[command(flatten)]
  env: EnvFlags,

  /// Path to the output GOROOT
  #[arg(long)]
  out: Option<PathBuf>,

  /// Build with the race detector
  #[arg(long)]
  race: bool,

  /// Build position independent code
  #[arg(long)]
  shared: bool,

  /// Build for dynamic linking
  #[arg(long)]
  dynlink: bool,

  /// Package to install (repeatable)
  #[arg(long = "package")]
  packages: Vec<String>,
}

pub fn cmd_stdlib(args: StdlibCmdArgs, tool_args: &[String], verbose: bool) -> Result<()> {
  let mut env = Env::new(args.env.into_config(verbose))?;
  let stdlib_args = StdlibArgs {
    out: args.out,
    race: args.race,
    shared: args.shared,
    dynlink: args.dynlink,
    packages: args.packages,
  };

  stdlib(&mut env, &stdlib_args, tool_args).context("Failed to build standard library")?;
  Ok(())
}

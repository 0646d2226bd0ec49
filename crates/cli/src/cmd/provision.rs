//! Implementation of the `gostd provision` command.
//!
//! Describes the SDK at `--sdk-root`, decides whether its precompiled standard
//! library fits the requested configuration, and otherwise builds one under
//! `--out` by running the planned actions locally. With `--dry-run` the plan
//! is printed as JSON instead.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use gostd_lib::action::{LocalActions, PlannedActions};
use gostd_lib::env::{Env, EnvConfig, EnvVars};
use gostd_lib::mode::{LinkMode, PlatformMode};
use gostd_lib::platform::Platform;
use gostd_lib::platform::arch::Arch;
use gostd_lib::platform::os::Os;
use gostd_lib::sdk::{CcToolchain, PACKAGE_LIST_NAME, Sdk};
use gostd_lib::stdlib::{Packager, ProvisionContext, StdLib, provision};

use crate::output::{Status, print_json, print_stat, print_status};

#[derive(Args, Debug)]
pub struct ProvisionArgs {
  /// Root of the installed Go SDK
  #[arg(long)]
  sdk_root: PathBuf,

  /// Target operating system (defaults to the host)
  #[arg(long)]
  goos: Option<Os>,

  /// Target architecture (defaults to the host)
  #[arg(long)]
  goarch: Option<Arch>,

  /// Build with the race detector
  #[arg(long)]
  race: bool,

  /// Build with the memory sanitizer
  #[arg(long)]
  msan: bool,

  /// Disable cgo
  #[arg(long)]
  pure: bool,

  /// Link mode of the final binaries
  #[arg(long, default_value = "normal")]
  linkmode: LinkMode,

  /// Comma-separated build tags
  #[arg(long, value_delimiter = ',')]
  tags: Vec<String>,

  /// Directory the outputs are declared under
  #[arg(long)]
  out: PathBuf,

  /// C compiler used by cgo
  #[arg(long)]
  cc: Option<PathBuf>,

  /// C compile option (repeatable)
  #[arg(long = "copt", allow_hyphen_values = true)]
  copts: Vec<String>,

  /// C link option (repeatable)
  #[arg(long = "linkopt", allow_hyphen_values = true)]
  linkopts: Vec<String>,

  /// Standard library package list (generated with `go list std` when absent)
  #[arg(long)]
  package_list: Option<PathBuf>,

  /// Ship the SDK to the build as a single archive
  #[arg(long)]
  remote: bool,

  /// Print the planned actions as JSON without running them
  #[arg(long)]
  dry_run: bool,
}

#[derive(Serialize)]
struct DryRun<'a> {
  reused: bool,
  stdlib: &'a StdLib,
  plan: &'a PlannedActions,
}

pub fn cmd_provision(args: ProvisionArgs, verbose: bool) -> Result<()> {
  let native = Platform::current().context("Could not detect the host platform")?;

  let package_list = match args.package_list.clone() {
    Some(list) => Some(list),
    None if args.sdk_root.join(PACKAGE_LIST_NAME).is_file() => None,
    None => Some(generate_package_list(&args.sdk_root, &args.out, verbose)?),
  };
  let sdk = Sdk::discover(&args.sdk_root, native, package_list)
    .with_context(|| format!("Failed to read SDK at {}", args.sdk_root.display()))?;

  let mode = PlatformMode::new(args.goos.unwrap_or(native.os), args.goarch.unwrap_or(native.arch))
    .with_race(args.race)
    .with_msan(args.msan)
    .with_pure(args.pure)
    .with_link(args.linkmode);
  let reused = mode.can_reuse_sdk_stdlib(sdk.platform());

  let self_exe = std::env::current_exe().context("Failed to locate the gostd executable")?;
  let mut ctx = ProvisionContext::new(mode, sdk, &self_exe);
  ctx.tags = args.tags;
  ctx.cc = args.cc.map(|cc| CcToolchain {
    files: vec![cc.clone()],
    compiler_path: cc,
    compile_options: args.copts,
    link_options: args.linkopts,
  });
  if args.remote {
    ctx.packager = Some(Packager {
      executable: self_exe.clone(),
      leading_args: vec!["pack".to_string()],
    });
  }

  if args.dry_run {
    let mut plan = PlannedActions::new(&args.out);
    let stdlib = provision(&ctx, &mut plan)?;
    return print_json(&DryRun {
      reused,
      stdlib: &stdlib,
      plan: &plan,
    });
  }

  let mut actions = LocalActions::new(&args.out);
  let stdlib = provision(&ctx, &mut actions).context("Failed to provision the standard library")?;

  if reused {
    print_status(Status::Info, &format!("Reusing the precompiled standard library for {}", mode.install_suffix()));
  } else {
    print_status(Status::Success, &format!("Built the standard library for {}", mode.install_suffix()));
  }
  print_stat("Root", &stdlib.root_file.display().to_string());
  for lib in &stdlib.libs {
    print_stat("Library", &lib.display().to_string());
  }
  Ok(())
}

/// Write the output of `go list std` to `<out>/packages.txt`.
fn generate_package_list(sdk_root: &Path, out: &Path, verbose: bool) -> Result<PathBuf> {
  let env = Env::new(EnvConfig {
    sdk: Some(sdk_root.to_path_buf()),
    verbose,
    ..Default::default()
  })?;

  std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
  let path = out.join(PACKAGE_LIST_NAME);
  let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
  let mut writer = BufWriter::new(file);

  let mut go_env = EnvVars::new();
  go_env.insert("GOROOT".to_string(), sdk_root.to_string_lossy().into_owned());
  go_env.insert("GOTOOLCHAIN".to_string(), "local".to_string());
  env
    .run_command_to_writer(&mut writer, &env.go_cmd("list", &["std".to_string()]), &go_env)
    .context("Failed to list standard library packages")?;
  writer.flush().with_context(|| format!("Failed to write {}", path.display()))?;
  Ok(path)
}

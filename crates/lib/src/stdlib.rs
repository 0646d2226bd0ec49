//! Standard library provisioning.
//!
//! Given a target [`PlatformMode`], either hand back the SDK's precompiled
//! standard library or declare the actions that build a fresh one.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::action::{ActionError, ActionRequest, Actions};
use crate::args::PARAM_FILE_PREFIX;
use crate::mode::PlatformMode;
use crate::sdk::{CcToolchain, Sdk};

/// Directory all provisioning outputs are declared under.
pub const OUTPUT_DIR: &str = "stdlib_";

pub const STDLIB_MNEMONIC: &str = "GoStdlib";
pub const PACKAGE_MNEMONIC: &str = "GoSdkZip";

#[derive(Debug, Error)]
pub enum ProvisionError {
  #[error("cgo is enabled for {platform} but no C toolchain was configured")]
  MissingCcToolchain { platform: String },

  #[error("SDK input {path} is not under the SDK root {root}")]
  InputOutsideRoot { path: PathBuf, root: PathBuf },

  #[error(transparent)]
  Action(#[from] ActionError),
}

/// Command that packages files into a zip: `<executable> <leading_args>... <out> -param=<file>`,
/// where `<file>` lists one `name=path` entry per line.
#[derive(Debug, Clone)]
pub struct Packager {
  pub executable: PathBuf,
  pub leading_args: Vec<String>,
}

/// Everything [`provision`] needs to know about the build.
#[derive(Debug, Clone)]
pub struct ProvisionContext {
  pub mode: PlatformMode,
  pub sdk: Sdk,
  /// Required unless the mode is pure.
  pub cc: Option<CcToolchain>,
  /// Executable implementing the `stdlib` builder verb.
  pub builder: PathBuf,
  /// When set, the SDK is shipped to the build as a single archive.
  pub packager: Option<Packager>,
  pub tags: Vec<String>,
  /// Extra variables merged into the Go environment of the build action.
  pub go_env: BTreeMap<String, String>,
}

impl ProvisionContext {
  pub fn new(mode: PlatformMode, sdk: Sdk, builder: impl Into<PathBuf>) -> Self {
    Self {
      mode,
      sdk,
      cc: None,
      builder: builder.into(),
      packager: None,
      tags: Vec::new(),
      go_env: BTreeMap::new(),
    }
  }

  /// Variables every Go action runs with for this mode.
  pub fn base_go_env(&self) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("GOOS".to_string(), self.mode.goos.to_string());
    env.insert("GOARCH".to_string(), self.mode.goarch.to_string());
    env.insert("GOROOT".to_string(), self.sdk.root().to_string_lossy().into_owned());
    env.insert("GOROOT_FINAL".to_string(), "GOROOT".to_string());
    env.insert("GOTOOLCHAIN".to_string(), "local".to_string());
    env.extend(self.go_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
  }
}

/// The standard library a build compiles against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StdLib {
  /// File whose directory acts as GOROOT.
  pub root_file: PathBuf,
  /// Compiled package archives, or the directory holding them.
  pub libs: Vec<PathBuf>,
}

/// Provide a standard library for `ctx.mode`.
///
/// Reuses the SDK's precompiled library when the mode allows it, without
/// touching `actions`. Otherwise writes the root marker, optionally packages
/// the SDK, and issues the build action.
pub fn provision(ctx: &ProvisionContext, actions: &mut impl Actions) -> Result<StdLib, ProvisionError> {
  let native = ctx.sdk.platform();
  if ctx.mode.can_reuse_sdk_stdlib(native) {
    debug!(mode = ?ctx.mode, native = %native, "reusing precompiled standard library");
    return Ok(StdLib {
      root_file: ctx.sdk.root_file.clone(),
      libs: ctx.sdk.libs.clone(),
    });
  }
  debug!(mode = ?ctx.mode, native = %native, "standard library must be rebuilt");
  build_stdlib(ctx, actions)
}

fn build_stdlib(ctx: &ProvisionContext, actions: &mut impl Actions) -> Result<StdLib, ProvisionError> {
  let mode = &ctx.mode;
  let cc = if mode.pure {
    None
  } else {
    Some(ctx.cc.as_ref().ok_or_else(|| ProvisionError::MissingCcToolchain {
      platform: mode.platform().pair(),
    })?)
  };

  let pkg = actions.declare_directory(&format!("{}/pkg", OUTPUT_DIR));
  let src = actions.declare_directory(&format!("{}/src", OUTPUT_DIR));
  let root_file = actions.declare_file(&format!("{}/ROOT", OUTPUT_DIR));
  // The marker must exist before the action runs so it can serve as GOROOT anchor.
  actions.write_file(&root_file, b"")?;
  let out_dir = root_file.parent().unwrap_or(Path::new(OUTPUT_DIR)).to_path_buf();

  let mut args = vec![
    "stdlib".to_string(),
    "--sdk".to_string(),
    ctx.sdk.root().to_string_lossy().into_owned(),
    "--installsuffix".to_string(),
    mode.install_suffix(),
  ];
  if !ctx.tags.is_empty() {
    args.push("--tags".to_string());
    args.push(ctx.tags.join(","));
  }
  args.push("--out".to_string());
  args.push(out_dir.to_string_lossy().into_owned());
  if mode.race {
    args.push("--race".to_string());
  }
  args.extend(mode.link.builder_flags().iter().map(|flag| flag.to_string()));

  let mut inputs = match &ctx.packager {
    Some(packager) => {
      let archive = package_sdk(ctx, packager, actions)?;
      args.push("--sdkzip".to_string());
      args.push(archive.to_string_lossy().into_owned());
      vec![archive]
    }
    None => ctx.sdk.inputs(),
  };
  if let Some(cc) = cc {
    inputs.extend(cc.files.iter().cloned());
  }
  inputs.push(ctx.sdk.package_list.clone());

  args.push("--package".to_string());
  args.push("std".to_string());
  if !mode.pure {
    args.push("--package".to_string());
    args.push("runtime/cgo".to_string());
  }

  let mut env = ctx.base_go_env();
  match cc {
    None => {
      env.insert("CGO_ENABLED".to_string(), "0".to_string());
    }
    Some(cc) => {
      env.insert("CGO_ENABLED".to_string(), "1".to_string());
      env.insert("CC".to_string(), cc.compiler_path.to_string_lossy().into_owned());
      env.insert("CGO_CFLAGS".to_string(), cc.compile_options.join(" "));
      env.insert("CGO_LDFLAGS".to_string(), cc.link_options.join(" "));
    }
  }

  info!(install_suffix = %mode.install_suffix(), inputs = inputs.len(), "building standard library");
  actions.run(ActionRequest {
    mnemonic: STDLIB_MNEMONIC.to_string(),
    executable: ctx.builder.clone(),
    arguments: args,
    inputs,
    outputs: vec![pkg.clone(), src],
    env,
  })?;

  Ok(StdLib {
    root_file,
    libs: vec![pkg],
  })
}

/// Issue the action that zips every SDK input into one archive.
///
/// The `name=path` entries go into a params file next to the archive; a
/// full SDK has far more files than fit on a command line.
fn package_sdk(ctx: &ProvisionContext, packager: &Packager, actions: &mut impl Actions) -> Result<PathBuf, ProvisionError> {
  let archive = actions.declare_file(&format!("{}/sdk.zip", OUTPUT_DIR));
  let params = actions.declare_file(&format!("{}/sdk.zip.params", OUTPUT_DIR));
  let root = ctx.sdk.root();
  let mut inputs = ctx.sdk.inputs();

  let mut entries = String::new();
  for input in &inputs {
    entries.push_str(&format!("{}={}\n", archive_name(root, input)?, input.display()));
  }
  actions.write_file(&params, entries.as_bytes())?;

  let mut args = packager.leading_args.clone();
  args.push(archive.to_string_lossy().into_owned());
  args.push(format!("{}{}", PARAM_FILE_PREFIX, params.display()));

  info!(entries = inputs.len(), archive = %archive.display(), "packaging SDK");
  inputs.push(params);
  actions.run(ActionRequest {
    mnemonic: PACKAGE_MNEMONIC.to_string(),
    executable: packager.executable.clone(),
    arguments: args,
    inputs,
    outputs: vec![archive.clone()],
    env: BTreeMap::new(),
  })?;
  Ok(archive)
}

/// Path of `input` relative to `root`, with `/` separators.
fn archive_name(root: &Path, input: &Path) -> Result<String, ProvisionError> {
  let outside = || ProvisionError::InputOutsideRoot {
    path: input.to_path_buf(),
    root: root.to_path_buf(),
  };
  let relative = input.strip_prefix(root).map_err(|_| outside())?;
  let mut parts = Vec::new();
  for component in relative.components() {
    match component {
      Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
      _ => return Err(outside()),
    }
  }
  Ok(parts.join("/"))
}

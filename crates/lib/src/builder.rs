//! Builder verbs run inside build actions.
//!
//! - [`stdlib`]: assemble a fresh GOROOT and compile the standard library into it
//! - [`filterbuildid`]: `-toolexec` wrapper that blanks build IDs

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::args::{ArgsError, CGO_ABS_ENV_FLAGS, CGO_ENV_VARS, abs, quote_if_needed, split_quoted};
use crate::env::{Env, EnvError, EnvVars, abs_env};
use crate::platform::arch::Arch;
use crate::platform::os::Os;
use crate::replicate::{ReplicateConfig, ReplicateError, replicate};

/// `CC` value a build system uses when no C toolchain could be configured.
pub const MISSING_CC_PLACEHOLDER: &str = "vc_installation_error.bat";

/// SDK directories a standard library build needs in its new GOROOT.
pub const STDLIB_PATHS: &[&str] = &["src", "pkg/tool", "pkg/include"];

#[derive(Debug, Error)]
pub enum BuilderError {
  #[error("--out was not set")]
  MissingOut,

  #[error("cgo is required, but a C toolchain has not been configured")]
  MissingCcToolchain,

  #[error("failed to locate the running executable: {0}")]
  CurrentExe(#[source] io::Error),

  #[error("no tool command given")]
  EmptyToolCommand,

  #[error("error running subcommand {program}: {source}")]
  ToolSpawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("error running subcommand {program}: exit code {code:?}")]
  ToolFailed { program: String, code: Option<i32> },

  #[error(transparent)]
  Env(#[from] EnvError),

  #[error(transparent)]
  Replicate(#[from] ReplicateError),

  #[error(transparent)]
  Args(#[from] ArgsError),
}

/// Flags of the `stdlib` verb beyond the shared environment flags.
#[derive(Debug, Clone, Default)]
pub struct StdlibArgs {
  /// Directory that becomes the new GOROOT.
  pub out: Option<PathBuf>,
  pub race: bool,
  pub shared: bool,
  pub dynlink: bool,
  /// Import paths to install, e.g. `std` and `runtime/cgo`.
  pub packages: Vec<String>,
}

/// Build the standard library into a new GOROOT at `args.out`.
///
/// The SDK named by `env` (or its archive) is staged into the output, then
/// `go install` runs there with build IDs stripped so results are
/// reproducible. `tool_args` are passed to `go install` before the packages.
/// The env's install suffix is not forwarded; `go install` derives the
/// archive directory itself.
pub fn stdlib(env: &mut Env, args: &StdlibArgs, tool_args: &[String]) -> Result<(), BuilderError> {
  let out = args.out.as_deref().ok_or(BuilderError::MissingOut)?;
  let output = PathBuf::from(abs(&out.to_string_lossy()));

  if getenv("CGO_ENABLED") == "1" && Path::new(&getenv("CC")).file_name().is_some_and(|f| f == MISSING_CC_PLACEHOLDER)
  {
    return Err(BuilderError::MissingCcToolchain);
  }

  match env.sdk_zip().map(Path::to_path_buf) {
    Some(archive) => {
      let mut paths = STDLIB_PATHS.to_vec();
      paths.push("bin");
      info!(archive = %archive.display(), out = %output.display(), "staging SDK from archive");
      replicate(env.sdk(), &output, &ReplicateConfig::new().with_paths(paths).with_zip(archive))?;
      env.set_sdk(&output);
    }
    None => {
      info!(sdk = %env.sdk().display(), out = %output.display(), "staging SDK");
      replicate(env.sdk(), &output, &ReplicateConfig::new().with_paths(STDLIB_PATHS.iter().copied()))?;
    }
  }

  let cache = output.join(".gocache");
  let mut child_env = stdlib_env(&output, &cache)?;
  let (work, _work_guard) = env.work_dir()?;
  child_env.insert("GOTMPDIR".to_string(), work.to_string_lossy().into_owned());

  let self_exe = std::env::current_exe().map_err(BuilderError::CurrentExe)?;
  let toolexec = format!("{} filterbuildid --", abs(&self_exe.to_string_lossy()));
  let mut install_args = vec!["-toolexec".to_string(), toolexec];
  install_args.extend(install_flags(env, args, &output));
  install_args.extend(tool_args.iter().cloned());
  install_args.extend(args.packages.iter().cloned());

  let command = env.go_cmd("install", &install_args);
  let result = env.run_command(&command, &child_env);

  match std::fs::remove_dir_all(&cache) {
    Err(e) if e.kind() != io::ErrorKind::NotFound => {
      warn!(path = %cache.display(), error = %e, "failed to remove build cache");
    }
    _ => {}
  }
  result?;
  Ok(())
}

/// Flags for `go install` after `-toolexec`: tags, race, and the
/// per-tool flag sets applied to every package.
fn install_flags(env: &Env, args: &StdlibArgs, output: &Path) -> Vec<String> {
  let sandbox = abs(".");
  let mut flags = Vec::new();
  if !env.tags().is_empty() {
    flags.push("-tags".to_string());
    flags.push(env.tags().join(","));
  }
  if args.race {
    flags.push("-race".to_string());
  }

  let mut gcflags: Vec<String> = Vec::new();
  let mut ldflags = vec!["-trimpath".to_string(), sandbox];
  let mut asmflags = vec!["-trimpath".to_string(), output.to_string_lossy().into_owned()];
  for (enabled, flag) in [(args.shared, "-shared"), (args.dynlink, "-dynlink")] {
    if enabled {
      gcflags.push(flag.to_string());
      ldflags.push(flag.to_string());
      asmflags.push(flag.to_string());
    }
  }
  flags.push(format!("-gcflags=all={}", gcflags.join(" ")));
  flags.push(format!("-ldflags=all={}", ldflags.join(" ")));
  flags.push(format!("-asmflags=all={}", asmflags.join(" ")));
  flags
}

/// Variables `go install` needs on top of the inherited environment.
fn stdlib_env(output: &Path, cache: &Path) -> Result<EnvVars, BuilderError> {
  let goos = getenv("GOOS").parse::<Os>().ok();
  let goarch = getenv("GOARCH").parse::<Arch>().ok();

  let mut env = EnvVars::new();
  env.insert("GOROOT".to_string(), output.to_string_lossy().into_owned());
  env.insert("GOCACHE".to_string(), cache.to_string_lossy().into_owned());
  // A go.mod in a parent of the sandbox would otherwise turn modules on.
  env.insert("GO111MODULE".to_string(), "off".to_string());
  env.insert("GODEBUG".to_string(), "installgoroot=all".to_string());

  let cc = getenv("CC");
  if !cc.is_empty() {
    env.insert("CC".to_string(), quote_if_needed(&abs(&cc)));
  }
  if let Some(path) = std::env::var_os("PATH") {
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).map(|dir| PathBuf::from(abs(&dir.to_string_lossy()))).collect();
    match std::env::join_paths(dirs) {
      Ok(joined) => {
        env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
      }
      Err(e) => debug!(error = %e, "keeping PATH as is"),
    }
  }

  let mut cgo = EnvVars::new();
  for name in CGO_ENV_VARS {
    if let Ok(value) = std::env::var(name) {
      cgo.insert(name.to_string(), value);
    }
  }
  let cflags = join_flags(&getenv("CGO_CFLAGS"), &default_cflags(goos, goarch, output));
  let ldflags = join_flags(&getenv("CGO_LDFLAGS"), &default_ldflags(goos, goarch));
  env.insert("CGO_LDFLAGS_ALLOW".to_string(), ldflags_allow(&split_quoted(&ldflags)?));
  cgo.insert("CGO_CFLAGS".to_string(), cflags);
  cgo.insert("CGO_LDFLAGS".to_string(), ldflags);
  env.extend(abs_env(&cgo, CGO_ENV_VARS, CGO_ABS_ENV_FLAGS));

  Ok(env)
}

fn getenv(name: &str) -> String {
  std::env::var(name).unwrap_or_default()
}

fn join_flags(base: &str, extra: &[String]) -> String {
  let mut words: Vec<&str> = base.split_whitespace().collect();
  words.extend(extra.iter().map(String::as_str));
  words.join(" ")
}

/// C flags that keep sandbox and output paths out of debug information.
fn default_cflags(goos: Option<Os>, goarch: Option<Arch>, output: &Path) -> Vec<String> {
  let mut flags = vec![
    format!("-fdebug-prefix-map={}=.", abs(".")),
    format!("-fdebug-prefix-map={}=GOROOT", output.display()),
  ];
  match (goos, goarch) {
    (Some(os), _) if os.is_apple() => {}
    (Some(Os::Windows), Some(Arch::Amd64)) => flags.push("-mthreads".to_string()),
    _ => flags.push("-pthread".to_string()),
  }
  flags
}

fn default_ldflags(goos: Option<Os>, goarch: Option<Arch>) -> Vec<String> {
  let flags: &[&str] = match (goos, goarch) {
    (Some(Os::Android), _) => &["-llog", "-ldl"],
    (Some(os), _) if os.is_apple() => &[],
    (Some(Os::Windows), Some(Arch::Amd64)) => &["-mthreads"],
    _ => &["-pthread"],
  };
  flags.iter().map(|flag| flag.to_string()).collect()
}

/// Pattern accepting exactly the given link flags in `CGO_LDFLAGS_ALLOW`.
///
/// The value after `-framework` shares its alternative, so the pair is
/// matched as one.
fn ldflags_allow(flags: &[String]) -> String {
  let mut pattern = String::new();
  let mut sep = "";
  for flag in flags {
    pattern.push_str(sep);
    pattern.push_str(&regex::escape(flag));
    sep = if flag == "-framework" { " " } else { "|" };
  }
  pattern
}

/// Replace `-buildid X` and `-buildid=X` with an empty `-buildid=`.
pub fn filter_buildid_args(args: &[String]) -> Vec<String> {
  let mut filtered = Vec::with_capacity(args.len());
  let mut iter = args.iter();
  while let Some(arg) = iter.next() {
    if arg == "-buildid" {
      iter.next();
      filtered.push("-buildid=".to_string());
    } else if arg.starts_with("-buildid=") {
      filtered.push("-buildid=".to_string());
    } else {
      filtered.push(arg.clone());
    }
  }
  filtered
}

/// Run a Go tool command line with its build ID blanked.
pub fn filterbuildid(tool_args: &[String]) -> Result<(), BuilderError> {
  let args = filter_buildid_args(tool_args);
  let (program, rest) = args.split_first().ok_or(BuilderError::EmptyToolCommand)?;
  debug!(program = %program, "running tool without build id");
  let status = Command::new(program)
    .args(rest)
    .status()
    .map_err(|source| BuilderError::ToolSpawn {
      program: program.clone(),
      source,
    })?;
  if !status.success() {
    return Err(BuilderError::ToolFailed {
      program: program.clone(),
      code: status.code(),
    });
  }
  Ok(())
}

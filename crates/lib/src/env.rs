//! Environment shared by the builder verbs.
//!
//! [`Env`] holds the small amount of Go toolchain information every verb
//! needs (SDK location, tags, install suffix), a lazily created scratch
//! directory, and the helpers used to run Go tools as subprocesses.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::args::{abs_args, quote_if_needed};
use crate::platform::{Platform, os::Os};

/// Name prefix of scratch directories, so tooling can recognise leftovers.
pub const WORK_DIR_PREFIX: &str = "gostd_work-";

/// Environment variable overrides applied on top of the inherited environment.
pub type EnvVars = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum EnvError {
  #[error("--sdk was not set")]
  MissingSdk,

  #[error("failed to create work directory: {0}")]
  WorkDir(#[source] io::Error),

  #[error("no command to run")]
  EmptyCommand,

  #[error("error running subcommand {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("error running subcommand {program}: {status}")]
  CommandFailed { program: String, status: ExitStatus },

  #[error("failed to write command output: {0}")]
  Output(#[source] io::Error),
}

/// Flag values an [`Env`] is built from.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
  /// Path to the Go SDK holding tools for the host platform. Required.
  pub sdk: Option<PathBuf>,
  /// The SDK packaged as a zip archive, used when building the standard library.
  pub sdk_zip: Option<PathBuf>,
  /// Build tags considered true.
  pub tags: Vec<String>,
  /// Directory below `GOROOT/pkg` with the archives to build against (e.g. `linux_amd64_race`).
  pub install_suffix: String,
  /// Print subprocess command lines before running them.
  pub verbose: bool,
  /// Keep the scratch directory instead of deleting it.
  pub preserve_work_dir: bool,
}

#[derive(Debug)]
pub struct Env {
  sdk: PathBuf,
  sdk_zip: Option<PathBuf>,
  tags: Vec<String>,
  install_suffix: String,
  verbose: bool,
  preserve_work_dir: bool,
  work_dir: Option<PathBuf>,
}

/// Removes a scratch directory when cleaned up or dropped.
///
/// Inert when the directory was already handed out before, or when the
/// environment preserves its work directory.
#[must_use = "dropping the guard removes the work directory"]
#[derive(Debug)]
pub struct WorkDirGuard {
  path: Option<PathBuf>,
}

impl WorkDirGuard {
  fn inert() -> Self {
    Self { path: None }
  }

  /// Remove the directory now.
  pub fn cleanup(mut self) {
    self.remove();
  }

  fn remove(&mut self) {
    let Some(path) = self.path.take() else {
      return;
    };
    if let Err(e) = fs::remove_dir_all(&path) {
      warn!(path = %path.display(), error = %e, "failed to remove work directory");
    }
  }
}

impl Drop for WorkDirGuard {
  fn drop(&mut self) {
    self.remove();
  }
}

impl Env {
  /// Validate flag values and build the environment.
  pub fn new(config: EnvConfig) -> Result<Self, EnvError> {
    let sdk = match config.sdk {
      Some(sdk) if !sdk.as_os_str().is_empty() => sdk,
      _ => return Err(EnvError::MissingSdk),
    };
    Ok(Self {
      sdk,
      sdk_zip: config.sdk_zip,
      tags: config.tags,
      install_suffix: config.install_suffix,
      verbose: config.verbose,
      preserve_work_dir: config.preserve_work_dir,
      work_dir: None,
    })
  }

  pub fn sdk(&self) -> &Path {
    &self.sdk
  }

  /// Point the environment at a different SDK, e.g. one unpacked from the archive.
  pub fn set_sdk(&mut self, sdk: impl Into<PathBuf>) {
    self.sdk = sdk.into();
  }

  pub fn sdk_zip(&self) -> Option<&Path> {
    self.sdk_zip.as_deref()
  }

  pub fn tags(&self) -> &[String] {
    &self.tags
  }

  /// The `--installsuffix` value. The `stdlib` verb only carries it: `go
  /// install` picks the `pkg/` subdirectory from `-race` on its own.
  pub fn install_suffix(&self) -> &str {
    &self.install_suffix
  }

  pub fn verbose(&self) -> bool {
    self.verbose
  }

  /// Returns the scratch directory, creating it on first use.
  ///
  /// Only the first call returns a guard that owns the directory; the caller
  /// keeps it alive for as long as the directory is needed.
  pub fn work_dir(&mut self) -> Result<(PathBuf, WorkDirGuard), EnvError> {
    if let Some(path) = &self.work_dir {
      return Ok((path.clone(), WorkDirGuard::inert()));
    }
    let path = tempfile::Builder::new()
      .prefix(WORK_DIR_PREFIX)
      .tempdir()
      .map_err(EnvError::WorkDir)?
      .keep();
    if self.verbose {
      info!("WORK={}", path.display());
    }
    self.work_dir = Some(path.clone());
    let guard = if self.preserve_work_dir {
      WorkDirGuard::inert()
    } else {
      WorkDirGuard {
        path: Some(path.clone()),
      }
    };
    Ok((path, guard))
  }

  /// Command line for a tool in `$SDK/pkg/tool/<host>/`.
  pub fn go_tool(&self, tool: &str, args: &[String]) -> Vec<String> {
    let host = host_platform();
    let mut path = self.sdk.join("pkg").join("tool").join(&host).join(tool);
    if is_windows_host() {
      path.as_mut_os_string().push(Os::Windows.exe_suffix());
    }
    let mut cmd = vec![path.to_string_lossy().into_owned()];
    cmd.extend(args.iter().cloned());
    cmd
  }

  /// Command line for `$SDK/bin/go <cmd> args...`.
  pub fn go_cmd(&self, cmd: &str, args: &[String]) -> Vec<String> {
    let mut exe = self.sdk.join("bin").join("go");
    if is_windows_host() {
      exe.as_mut_os_string().push(Os::Windows.exe_suffix());
    }
    let mut out = vec![exe.to_string_lossy().into_owned(), cmd.to_string()];
    out.extend(args.iter().cloned());
    out
  }

  /// Run a subprocess that inherits stdout, stderr and the environment,
  /// with `env` applied on top.
  pub fn run_command(&self, args: &[String], env: &EnvVars) -> Result<(), EnvError> {
    let mut command = self.command(args, env)?;
    command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    let status = command.status().map_err(|source| EnvError::Spawn {
      program: args[0].clone(),
      source,
    })?;
    check_status(&args[0], status)
  }

  /// Run a subprocess and write its stdout to `w`.
  pub fn run_command_to_writer(&self, w: &mut impl Write, args: &[String], env: &EnvVars) -> Result<(), EnvError> {
    let mut command = self.command(args, env)?;
    command.stdout(Stdio::piped()).stderr(Stdio::inherit());
    let output = command.output().map_err(|source| EnvError::Spawn {
      program: args[0].clone(),
      source,
    })?;
    w.write_all(&output.stdout).map_err(EnvError::Output)?;
    check_status(&args[0], output.status)
  }

  /// The shell-pasteable form of a command about to run, when verbose.
  fn verbose_line(&self, args: &[String], env: &EnvVars) -> Option<String> {
    if !self.verbose {
      return None;
    }
    let mut environ: EnvVars = std::env::vars_os()
      .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
      .collect();
    environ.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
    Some(format_command(&environ, args))
  }

  fn command(&self, args: &[String], env: &EnvVars) -> Result<Command, EnvError> {
    let (program, rest) = args.split_first().ok_or(EnvError::EmptyCommand)?;
    if let Some(line) = self.verbose_line(args, env) {
      eprint!("{}", line);
    }
    debug!(program = %program, args = rest.len(), "running command");
    let mut command = Command::new(program);
    command.args(rest).envs(env);
    Ok(command)
  }
}

fn check_status(program: &str, status: ExitStatus) -> Result<(), EnvError> {
  if status.success() {
    Ok(())
  } else {
    Err(EnvError::CommandFailed {
      program: program.to_string(),
      status,
    })
  }
}

fn host_platform() -> String {
  Platform::current()
    .map(|p| p.pair())
    .unwrap_or_else(|| format!("{}_{}", std::env::consts::OS, std::env::consts::ARCH))
}

fn is_windows_host() -> bool {
  cfg!(windows)
}

/// Render a command so it can be pasted into a shell.
///
/// Each environment assignment goes on its own continued line, followed by
/// the arguments. Values containing spaces are quoted.
pub fn format_command(environ: &EnvVars, args: &[String]) -> String {
  let mut out = String::new();
  for (key, value) in environ {
    out.push_str(&format!("{}={} \\\n", key, quote_if_needed(value)));
  }
  let line: Vec<String> = args.iter().map(|arg| quote_if_needed(arg)).collect();
  out.push_str(&line.join(" "));
  out.push('\n');
  out
}

/// Make path flags in the named variables absolute.
///
/// Each variable present in `env` is split on whitespace, rewritten with
/// [`abs_args`] for `flags`, and joined back with single spaces. Variables
/// missing from `env` are left out of the result.
pub fn abs_env(env: &EnvVars, names: &[&str], flags: &[&str]) -> EnvVars {
  let mut out = EnvVars::new();
  for name in names {
    let Some(value) = env.get(*name) else {
      continue;
    };
    let mut words: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    abs_args(&mut words, flags);
    out.insert(name.to_string(), words.join(" "));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::args::{CGO_ABS_ENV_FLAGS, CGO_ENV_VARS};
  use crate::util::testutil::{shell_cmd, shell_echo_env};
  use tempfile::TempDir;

  fn env_with_sdk(sdk: &Path) -> Env {
    Env::new(EnvConfig {
      sdk: Some(sdk.to_path_buf()),
      ..Default::default()
    })
    .unwrap()
  }

  fn command_line(program: &str, args: Vec<String>) -> Vec<String> {
    let mut out = vec![program.to_string()];
    out.extend(args);
    out
  }

  #[test]
  fn missing_sdk_is_rejected() {
    let err = Env::new(EnvConfig::default()).unwrap_err();
    assert!(matches!(err, EnvError::MissingSdk));
    assert_eq!(err.to_string(), "--sdk was not set");
  }

  #[test]
  fn work_dir_is_created_once() {
    let mut env = env_with_sdk(Path::new("/sdk"));

    let (first, guard) = env.work_dir().unwrap();
    let (second, inert) = env.work_dir().unwrap();

    assert_eq!(first, second);
    assert!(first.is_dir());
    let name = first.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(WORK_DIR_PREFIX));

    inert.cleanup();
    assert!(first.is_dir(), "only the first guard owns the directory");

    guard.cleanup();
    assert!(!first.exists());
  }

  #[test]
  fn work_dir_removed_when_guard_dropped() {
    let mut env = env_with_sdk(Path::new("/sdk"));
    let path = {
      let (path, _guard) = env.work_dir().unwrap();
      fs::write(path.join("scratch.txt"), "x").unwrap();
      path
    };
    assert!(!path.exists());
  }

  #[test]
  fn preserved_work_dir_survives_cleanup() {
    let mut env = Env::new(EnvConfig {
      sdk: Some(PathBuf::from("/sdk")),
      preserve_work_dir: true,
      ..Default::default()
    })
    .unwrap();

    let (path, guard) = env.work_dir().unwrap();
    guard.cleanup();

    assert!(path.is_dir());
    fs::remove_dir_all(&path).unwrap();
  }

  #[test]
  fn go_cmd_and_go_tool_live_under_sdk() {
    let env = env_with_sdk(Path::new("/opt/go"));

    let cmd = env.go_cmd("install", &["std".to_string()]);
    assert!(Path::new(&cmd[0]).starts_with("/opt/go/bin"));
    assert_eq!(&cmd[1..], &["install".to_string(), "std".to_string()]);

    let tool = env.go_tool("compile", &[]);
    let expected = Path::new("/opt/go/pkg/tool").join(host_platform());
    assert!(Path::new(&tool[0]).starts_with(expected));
    assert_eq!(tool.len(), 1);
  }

  #[test]
  fn run_command_passes_env_overrides() {
    let temp = TempDir::new().unwrap();
    let env = env_with_sdk(temp.path());
    let (program, args) = shell_echo_env("GOSTD_TEST_VAR");

    let mut vars = EnvVars::new();
    vars.insert("GOSTD_TEST_VAR".to_string(), "hello".to_string());
    let mut out = Vec::new();
    env
      .run_command_to_writer(&mut out, &command_line(program, args), &vars)
      .unwrap();

    assert_eq!(String::from_utf8(out).unwrap().trim(), "hello");
  }

  #[test]
  fn run_command_reports_failure() {
    let temp = TempDir::new().unwrap();
    let env = env_with_sdk(temp.path());
    let (program, args) = shell_cmd("exit 3");

    let err = env.run_command(&command_line(program, args), &EnvVars::new()).unwrap_err();

    assert!(matches!(err, EnvError::CommandFailed { .. }));
    assert!(err.to_string().starts_with("error running subcommand"));
  }

  #[test]
  fn run_command_missing_program() {
    let env = env_with_sdk(Path::new("/sdk"));
    let err = env
      .run_command(&["/definitely/not/a/program".to_string()], &EnvVars::new())
      .unwrap_err();
    assert!(matches!(err, EnvError::Spawn { .. }));
  }

  #[test]
  fn run_command_rejects_empty_command() {
    let env = env_with_sdk(Path::new("/sdk"));
    assert!(matches!(env.run_command(&[], &EnvVars::new()), Err(EnvError::EmptyCommand)));
  }

  #[test]
  fn verbose_env_renders_command_with_overrides() {
    let quiet = env_with_sdk(Path::new("/sdk"));
    let loud = Env::new(EnvConfig {
      sdk: Some(PathBuf::from("/sdk")),
      verbose: true,
      ..Default::default()
    })
    .unwrap();
    let mut vars = EnvVars::new();
    vars.insert("GOSTD_VERBOSE_VAR".to_string(), "two words".to_string());
    let args = vec!["go".to_string(), "install".to_string(), "std".to_string()];

    assert_eq!(quiet.verbose_line(&args, &vars), None);
    let line = loud.verbose_line(&args, &vars).unwrap();
    assert!(line.contains("GOSTD_VERBOSE_VAR=\"two words\" \\\n"), "{}", line);
    assert!(line.ends_with("\ngo install std\n"), "{}", line);
  }

  #[test]
  fn format_command_quotes_spaced_values() {
    let mut environ = EnvVars::new();
    environ.insert("CGO_CFLAGS".to_string(), "-O2 -g".to_string());
    environ.insert("GOOS".to_string(), "linux".to_string());
    let args = vec!["go".to_string(), "install".to_string(), "-gcflags=all=-N -l".to_string()];

    let formatted = format_command(&environ, &args);

    assert_eq!(
      formatted,
      "CGO_CFLAGS=\"-O2 -g\" \\\nGOOS=linux \\\ngo install \"-gcflags=all=-N -l\"\n"
    );
  }

  #[test]
  fn abs_env_rewrites_only_named_vars() {
    let mut env = EnvVars::new();
    env.insert("CGO_CFLAGS".to_string(), "-Iinclude  -O2".to_string());
    env.insert("CGO_LDFLAGS".to_string(), "-L lib -lm".to_string());
    env.insert("OTHER".to_string(), "-Iuntouched".to_string());

    let rewritten = abs_env(&env, CGO_ENV_VARS, CGO_ABS_ENV_FLAGS);

    let cwd = std::env::current_dir().unwrap();
    assert_eq!(rewritten["CGO_CFLAGS"], format!("-I{} -O2", cwd.join("include").display()));
    assert_eq!(rewritten["CGO_LDFLAGS"], format!("-L {} -lm", cwd.join("lib").display()));
    assert!(!rewritten.contains_key("OTHER"));
    assert!(!rewritten.contains_key("CGO_CXXFLAGS"));
  }
}

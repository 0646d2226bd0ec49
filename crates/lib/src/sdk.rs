//! Descriptors of the toolchains a standard library build consumes.
//!
//! - [`Sdk`]: the Go SDK installed on the host
//! - [`CcToolchain`]: the C toolchain cgo compiles and links with
//!
//! Build systems normally hand these in already resolved; [`Sdk::discover`]
//! builds one from an SDK directory on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::platform::Platform;
use crate::platform::arch::Arch;
use crate::platform::os::Os;

/// Marker files that may anchor an SDK root, in order of preference.
pub const ROOT_FILE_NAMES: &[&str] = &["ROOT", "VERSION"];

/// File listing the standard library packages, one import path per line.
pub const PACKAGE_LIST_NAME: &str = "packages.txt";

#[derive(Debug, Error)]
pub enum SdkError {
  #[error("SDK file not found: {0}")]
  MissingFile(PathBuf),

  #[error("no root marker ({markers}) in SDK at {root}")]
  MissingRootFile { root: PathBuf, markers: String },

  #[error("failed to scan SDK directory {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}

/// A Go SDK available on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sdk {
  /// Native OS of the SDK's precompiled library and tools.
  pub goos: Os,
  /// Native architecture of the SDK's precompiled library and tools.
  pub goarch: Arch,
  /// File whose directory is the SDK root.
  pub root_file: PathBuf,
  /// The `go` command.
  pub go: PathBuf,
  /// Standard library sources (`src/**`).
  pub srcs: Vec<PathBuf>,
  /// Runtime headers (`pkg/include/**`).
  pub headers: Vec<PathBuf>,
  /// Compiler, linker, assembler and friends (`pkg/tool/<host>/**`).
  pub tools: Vec<PathBuf>,
  /// Standard library package list.
  pub package_list: PathBuf,
  /// Precompiled standard library archives.
  pub libs: Vec<PathBuf>,
}

impl Sdk {
  /// Directory containing the root file.
  pub fn root(&self) -> &Path {
    self.root_file.parent().unwrap_or(Path::new(""))
  }

  pub fn platform(&self) -> Platform {
    Platform::new(self.goos, self.goarch)
  }

  /// Every file the standard library build reads from the SDK, excluding the
  /// package list: sources, headers, tools, the go command and the root file.
  pub fn inputs(&self) -> Vec<PathBuf> {
    let mut inputs = Vec::with_capacity(self.srcs.len() + self.headers.len() + self.tools.len() + 2);
    inputs.extend(self.srcs.iter().cloned());
    inputs.extend(self.headers.iter().cloned());
    inputs.extend(self.tools.iter().cloned());
    inputs.push(self.go.clone());
    inputs.push(self.root_file.clone());
    inputs
  }

  /// Describe the SDK installed at `root`, whose tools run on `native`.
  ///
  /// `package_list` overrides `<root>/packages.txt`, which real SDK
  /// distributions do not ship.
  pub fn discover(root: &Path, native: Platform, package_list: Option<PathBuf>) -> Result<Self, SdkError> {
    let root_file = ROOT_FILE_NAMES
      .iter()
      .map(|name| root.join(name))
      .find(|path| path.is_file())
      .ok_or_else(|| SdkError::MissingRootFile {
        root: root.to_path_buf(),
        markers: ROOT_FILE_NAMES.join(", "),
      })?;

    let go = root.join("bin").join(format!("go{}", native.os.exe_suffix()));
    if !go.is_file() {
      return Err(SdkError::MissingFile(go));
    }

    let package_list = package_list.unwrap_or_else(|| root.join(PACKAGE_LIST_NAME));
    if !package_list.is_file() {
      return Err(SdkError::MissingFile(package_list));
    }

    let pkg = root.join("pkg");
    let sdk = Self {
      goos: native.os,
      goarch: native.arch,
      srcs: files_under(&root.join("src"))?,
      headers: files_under(&pkg.join("include"))?,
      tools: files_under(&pkg.join("tool").join(native.pair()))?,
      libs: files_under(&pkg.join(native.pair()))?
        .into_iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == "a"))
        .collect(),
      root_file,
      go,
      package_list,
    };
    debug!(
      root = %root.display(),
      srcs = sdk.srcs.len(),
      headers = sdk.headers.len(),
      tools = sdk.tools.len(),
      libs = sdk.libs.len(),
      "discovered SDK"
    );
    Ok(sdk)
  }
}

/// Files below `dir` in a stable order. A missing directory has no files.
fn files_under(dir: &Path) -> Result<Vec<PathBuf>, SdkError> {
  if !dir.is_dir() {
    return Ok(Vec::new());
  }
  let mut files = Vec::new();
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|source| SdkError::Walk {
      path: dir.to_path_buf(),
      source,
    })?;
    if !entry.file_type().is_dir() {
      files.push(entry.into_path());
    }
  }
  Ok(files)
}

/// The C toolchain cgo uses when native interop is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcToolchain {
  /// Path of the C compiler, exported as `CC`.
  pub compiler_path: PathBuf,
  /// Options exported as `CGO_CFLAGS`.
  pub compile_options: Vec<String>,
  /// Options exported as `CGO_LDFLAGS`.
  pub link_options: Vec<String>,
  /// Every file the toolchain needs at execution time.
  pub files: Vec<PathBuf>,
}

//! Compilation mode of a standard library build.
//!
//! A [`PlatformMode`] is the configuration vector the provisioner compares
//! against the SDK's native platform to decide whether the precompiled
//! standard library can be reused.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::platform::arch::Arch;
use crate::platform::os::Os;

/// How the final binary is linked, mirroring `go build -buildmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkMode {
  #[default]
  Normal,
  Pie,
  Shared,
  Plugin,
  CArchive,
  CShared,
}

impl LinkMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Normal => "normal",
      Self::Pie => "pie",
      Self::Shared => "shared",
      Self::Plugin => "plugin",
      Self::CArchive => "c-archive",
      Self::CShared => "c-shared",
    }
  }

  /// Builder flags the `stdlib` verb needs to compile for this link mode.
  pub fn builder_flags(&self) -> &'static [&'static str] {
    match self {
      Self::Normal => &[],
      Self::Pie | Self::CArchive | Self::CShared => &["--shared"],
      Self::Shared => &["--shared", "--dynlink"],
      Self::Plugin => &["--dynlink"],
    }
  }
}

impl fmt::Display for LinkMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for LinkMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "normal" | "" => Ok(Self::Normal),
      "pie" => Ok(Self::Pie),
      "shared" => Ok(Self::Shared),
      "plugin" => Ok(Self::Plugin),
      "c-archive" => Ok(Self::CArchive),
      "c-shared" => Ok(Self::CShared),
      other => Err(format!("unsupported link mode '{}'", other)),
    }
  }
}

/// Target configuration of a standard library build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformMode {
  pub goos: Os,
  pub goarch: Arch,
  /// Build with the race detector.
  pub race: bool,
  /// Build with the memory sanitizer.
  pub msan: bool,
  /// Disable cgo.
  pub pure: bool,
  pub link: LinkMode,
}

impl PlatformMode {
  /// Plain mode for a platform: cgo on, no instrumentation, normal linking.
  pub fn new(goos: Os, goarch: Arch) -> Self {
    Self {
      goos,
      goarch,
      race: false,
      msan: false,
      pure: false,
      link: LinkMode::Normal,
    }
  }

  pub fn with_race(mut self, race: bool) -> Self {
    self.race = race;
    self
  }

  pub fn with_msan(mut self, msan: bool) -> Self {
    self.msan = msan;
    self
  }

  pub fn with_pure(mut self, pure: bool) -> Self {
    self.pure = pure;
    self
  }

  pub fn with_link(mut self, link: LinkMode) -> Self {
    self.link = link;
    self
  }

  pub fn platform(&self) -> Platform {
    Platform::new(self.goos, self.goarch)
  }

  /// Whether the SDK's precompiled standard library for `native` can stand in
  /// for a build in this mode.
  ///
  /// Precompiled archives never count as race-instrumented, even when the SDK
  /// ships race archives. They are also built with cgo available and for the
  /// normal link mode only.
  pub fn can_reuse_sdk_stdlib(&self, native: Platform) -> bool {
    self.goos == native.os
      && self.goarch == native.arch
      && !self.race
      && !self.msan
      && !self.pure
      && self.link == LinkMode::Normal
  }

  /// Name of the `pkg/` subdirectory `go install` writes this mode's archives
  /// to, e.g. `linux_amd64_race`.
  ///
  /// Only `-race` changes the directory: link modes reach the compiler
  /// through `-gcflags`/`-ldflags`, which leave it alone.
  pub fn install_suffix(&self) -> String {
    let mut suffix = self.platform().pair();
    if self.race {
      suffix.push_str("_race");
    }
    suffix
  }
}

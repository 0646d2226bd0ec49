//! Host and target platform identification.

pub mod arch;
pub mod link;
pub mod os;

use arch::Arch;
use os::Os;
use std::fmt;

/// Platform identifier combining OS and architecture (e.g., "linux_amd64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Platform {
  pub os: Os,
  pub arch: Arch,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// Detect the host platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Arch::current()?,
    })
  }

  /// Returns the `GOOS_GOARCH` pair used for `pkg/` and `pkg/tool/` directory names.
  pub fn pair(&self) -> String {
    format!("{}_{}", self.os, self.arch)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.pair())
  }
}

/// Returns the `GOOS_GOARCH` pair for the host (e.g., "linux_amd64")
///
/// Returns `None` if the host platform is not supported
pub fn platform_pair() -> Option<String> {
  Platform::current().map(|p| p.pair())
}

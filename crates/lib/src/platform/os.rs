use std::fmt;
use std::str::FromStr;

/// Target operating systems, named the way `GOOS` names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
  Linux,
  Darwin,
  Windows,
  FreeBsd,
  NetBsd,
  OpenBsd,
  Android,
  Ios,
}

impl Os {
  /// Detect the host operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::Darwin),
      "windows" => Some(Self::Windows),
      "freebsd" => Some(Self::FreeBsd),
      "netbsd" => Some(Self::NetBsd),
      "openbsd" => Some(Self::OpenBsd),
      "android" => Some(Self::Android),
      "ios" => Some(Self::Ios),
      _ => None,
    }
  }

  /// Returns the `GOOS` identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::Darwin => "darwin",
      Self::Windows => "windows",
      Self::FreeBsd => "freebsd",
      Self::NetBsd => "netbsd",
      Self::OpenBsd => "openbsd",
      Self::Android => "android",
      Self::Ios => "ios",
    }
  }

  /// Apple platforms share linker conventions (no `-pthread`, frameworks).
  pub fn is_apple(&self) -> bool {
    matches!(self, Self::Darwin | Self::Ios)
  }

  /// Suffix appended to executables on this OS.
  pub fn exe_suffix(&self) -> &'static str {
    match self {
      Self::Windows => ".exe",
      _ => "",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Os {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "linux" => Ok(Self::Linux),
      "darwin" | "macos" => Ok(Self::Darwin),
      "windows" => Ok(Self::Windows),
      "freebsd" => Ok(Self::FreeBsd),
      "netbsd" => Ok(Self::NetBsd),
      "openbsd" => Ok(Self::OpenBsd),
      "android" => Ok(Self::Android),
      "ios" => Ok(Self::Ios),
      other => Err(format!("unsupported GOOS '{}'", other)),
    }
  }
}

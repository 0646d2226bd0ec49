use std::fmt;
use std::str::FromStr;

/// Target CPU architectures, named the way `GOARCH` names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
  Amd64,
  Arm64,
  I386,
  Arm,
  Ppc64le,
  S390x,
  Riscv64,
}

impl Arch {
  /// Detect the host CPU architecture at runtime
  pub fn current() -> Option<Self> {
    Self::from_rust_arch(std::env::consts::ARCH, cfg!(target_endian = "little"))
  }

  /// Map a Rust `target_arch` name to its `GOARCH`.
  ///
  /// Rust names both PowerPC 64 byte orders `powerpc64`; only the
  /// little-endian one is supported.
  fn from_rust_arch(arch: &str, little_endian: bool) -> Option<Self> {
    match arch {
      "x86_64" => Some(Self::Amd64),
      "aarch64" => Some(Self::Arm64),
      "x86" => Some(Self::I386),
      "arm" => Some(Self::Arm),
      "powerpc64" if little_endian => Some(Self::Ppc64le),
      "s390x" => Some(Self::S390x),
      "riscv64" => Some(Self::Riscv64),
      _ => None,
    }
  }

  /// Returns the `GOARCH` identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Amd64 => "amd64",
      Self::Arm64 => "arm64",
      Self::I386 => "386",
      Self::Arm => "arm",
      Self::Ppc64le => "ppc64le",
      Self::S390x => "s390x",
      Self::Riscv64 => "riscv64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Arch {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "amd64" | "x86_64" => Ok(Self::Amd64),
      "arm64" | "aarch64" => Ok(Self::Arm64),
      "386" => Ok(Self::I386),
      "arm" => Ok(Self::Arm),
      "ppc64le" => Ok(Self::Ppc64le),
      "s390x" => Ok(Self::S390x),
      "riscv64" => Ok(Self::Riscv64),
      other => Err(format!("unsupported GOARCH '{}'", other)),
    }
  }
}

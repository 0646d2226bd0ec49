//! Packaging files into the zip archives that archive-mode replication reads.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("invalid archive entry '{0}': expected name=path")]
  InvalidEntry(String),

  #[error("failed to create archive {path}: {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to add {path} to archive: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write archive {path}: {source}")]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },
}

/// One file to store: `path` on disk, stored under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
  pub name: String,
  pub path: PathBuf,
}

impl FromStr for ArchiveEntry {
  type Err = ArchiveError;

  /// Parses `name=path`, splitting at the first `=`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once('=') {
      Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok(Self {
        name: name.to_string(),
        path: PathBuf::from(path),
      }),
      _ => Err(ArchiveError::InvalidEntry(s.to_string())),
    }
  }
}

/// Write `entries` into a new zip at `out`.
///
/// Entries are deflated, stamped with the zip epoch so identical inputs give
/// identical archives, and keep their unix permission bits. No directory
/// entries are written.
pub fn package_entries(out: &Path, entries: &[ArchiveEntry]) -> Result<(), ArchiveError> {
  if let Some(parent) = out.parent() {
    fs::create_dir_all(parent).map_err(|source| ArchiveError::Create {
      path: parent.to_path_buf(),
      source,
    })?;
  }
  let file = File::create(out).map_err(|source| ArchiveError::Create {
    path: out.to_path_buf(),
    source,
  })?;
  let zip_err = |source| ArchiveError::Zip {
    path: out.to_path_buf(),
    source,
  };

  let mut writer = ZipWriter::new(BufWriter::new(file));
  for entry in entries {
    let read_err = |source| ArchiveError::Read {
      path: entry.path.clone(),
      source,
    };
    let metadata = fs::metadata(&entry.path).map_err(read_err)?;
    let options = SimpleFileOptions::default()
      .compression_method(CompressionMethod::Deflated)
      .last_modified_time(DateTime::default())
      .unix_permissions(permissions(&metadata));

    writer.start_file(entry.name.as_str(), options).map_err(zip_err)?;
    let mut input = BufReader::new(File::open(&entry.path).map_err(read_err)?);
    io::copy(&mut input, &mut writer).map_err(read_err)?;
  }
  writer.finish().map_err(zip_err)?;

  debug!(archive = %out.display(), entries = entries.len(), "wrote archive");
  Ok(())
}

#[cfg(unix)]
fn permissions(metadata: &fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions(metadata: &fs::Metadata) -> u32 {
  if metadata.permissions().readonly() { 0o444 } else { 0o644 }
}

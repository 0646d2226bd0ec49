//! File tree replication.
//!
//! Makes a tree of files visible at a new location, either from the live
//! filesystem or from entries inside a zip archive. How each entry is made
//! visible (copy, hard link, symbolic link) is chosen per entity kind by
//! [`ReplicateMode`].

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::platform::link::{symlink_dir, symlink_file};

/// How a single file or directory is made visible at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicateMode {
  /// Duplicate the bytes and permission bits.
  #[default]
  Copy,
  /// Create a hard link to the source.
  Hardlink,
  /// Create a symbolic link to the source.
  Softlink,
}

#[derive(Debug, Error)]
pub enum ReplicateError {
  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to make {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to resolve {path}: {source}")]
  Resolve {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to replicate {src} to {dst}: {source}")]
  Entry {
    src: PathBuf,
    dst: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read archive {path}: {source}")]
  Archive {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },

  #[error("could not open zip file entry {name}: {source}")]
  ArchiveEntry {
    name: String,
    #[source]
    source: zip::result::ZipError,
  },

  #[error("zip file entry has an unsafe name: {0}")]
  UnsafeEntryName(String),

  #[error("path filter {0:?} must be a relative path inside the tree")]
  InvalidPathFilter(String),
}

/// Settings for one [`replicate`] call.
///
/// Build one with [`ReplicateConfig::new`] and the `with_*` methods; the
/// engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicateConfig {
  remove_first: bool,
  file_mode: ReplicateMode,
  dir_mode: ReplicateMode,
  paths: Vec<String>,
  zip: Option<PathBuf>,
}

impl Default for ReplicateConfig {
  fn default() -> Self {
    Self {
      remove_first: true,
      file_mode: ReplicateMode::Copy,
      dir_mode: ReplicateMode::Copy,
      paths: Vec::new(),
      zip: None,
    }
  }
}

impl ReplicateConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Restrict replication to these paths relative to the source.
  ///
  /// In archive mode they are matched as entry name prefixes.
  pub fn with_paths<I, S>(mut self, paths: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.paths.extend(paths.into_iter().map(Into::into));
    self
  }

  /// Read entries from this zip archive instead of the filesystem.
  pub fn with_zip(mut self, zip: impl Into<PathBuf>) -> Self {
    self.zip = Some(zip.into());
    self
  }

  pub fn with_file_mode(mut self, mode: ReplicateMode) -> Self {
    self.file_mode = mode;
    self
  }

  pub fn with_dir_mode(mut self, mode: ReplicateMode) -> Self {
    self.dir_mode = mode;
    self
  }

  pub fn with_remove_first(mut self, remove_first: bool) -> Self {
    self.remove_first = remove_first;
    self
  }

  pub fn remove_first(&self) -> bool {
    self.remove_first
  }

  pub fn file_mode(&self) -> ReplicateMode {
    self.file_mode
  }

  pub fn dir_mode(&self) -> ReplicateMode {
    self.dir_mode
  }

  pub fn paths(&self) -> &[String] {
    &self.paths
  }

  pub fn zip(&self) -> Option<&Path> {
    self.zip.as_deref()
  }
}

/// Make the tree rooted at `src` visible at `dst`.
///
/// By default the whole tree is copied and whatever was at `dst` is removed
/// first. `src` may be a single file. When the config names an archive, `src`
/// is ignored and entries are read from the archive instead.
pub fn replicate(src: &Path, dst: &Path, config: &ReplicateConfig) -> Result<(), ReplicateError> {
  for path in &config.paths {
    check_path_filter(path)?;
  }
  match config.zip() {
    None => replicate_filesystem(src, dst, config),
    Some(zip) => replicate_zip(zip, dst, config),
  }
}

/// A filter may only name something below the root: joined onto the
/// destination it must never escape it.
fn check_path_filter(path: &str) -> Result<(), ReplicateError> {
  let trimmed = Path::new(path.trim_end_matches('/'));
  let mut components = trimmed.components().peekable();
  if components.peek().is_none() || !components.all(|c| matches!(c, Component::Normal(_))) {
    return Err(ReplicateError::InvalidPathFilter(path.to_string()));
  }
  Ok(())
}

fn replicate_filesystem(src: &Path, dst: &Path, config: &ReplicateConfig) -> Result<(), ReplicateError> {
  if config.paths.is_empty() {
    return replicate_tree(src, dst, config);
  }
  for base in &config.paths {
    replicate_tree(&src.join(base), &dst.join(base), config)?;
  }
  Ok(())
}

fn replicate_tree(src: &Path, dst: &Path, config: &ReplicateConfig) -> Result<(), ReplicateError> {
  if config.remove_first {
    remove_all(dst)?;
  }
  let src = fs::canonicalize(src).map_err(|source| ReplicateError::Resolve {
    path: src.to_path_buf(),
    source,
  })?;
  debug!(src = %src.display(), dst = %dst.display(), "replicating");
  if src.is_dir() {
    replicate_dir(&src, dst, config)
  } else {
    replicate_file(&src, dst, config)
  }
}

/// Map a single file from `src` into `dst`.
fn replicate_file(src: &Path, dst: &Path, config: &ReplicateConfig) -> Result<(), ReplicateError> {
  prepare(dst, config)?;
  let entry_err = |source| ReplicateError::Entry {
    src: src.to_path_buf(),
    dst: dst.to_path_buf(),
    source,
  };
  match config.file_mode {
    ReplicateMode::Copy => {
      let permissions = fs::metadata(src).map_err(entry_err)?.permissions();
      let input = File::open(src).map_err(entry_err)?;
      create_file(BufReader::new(input), Some(permissions), dst).map_err(entry_err)
    }
    ReplicateMode::Hardlink => fs::hard_link(src, dst).map_err(entry_err),
    ReplicateMode::Softlink => symlink_file(src, dst).map_err(entry_err),
  }
}

/// Make a directory tree visible at `dst`.
///
/// Link modes issue a single link call for the directory itself.
fn replicate_dir(src: &Path, dst: &Path, config: &ReplicateConfig) -> Result<(), ReplicateError> {
  prepare(dst, config)?;
  let entry_err = |source| ReplicateError::Entry {
    src: src.to_path_buf(),
    dst: dst.to_path_buf(),
    source,
  };
  match config.dir_mode {
    ReplicateMode::Copy => {
      for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|source| ReplicateError::Walk {
          path: src.to_path_buf(),
          source,
        })?;
        if entry.file_type().is_dir() {
          continue;
        }
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        replicate_file(entry.path(), &dst.join(relative), config)?;
      }
      Ok(())
    }
    ReplicateMode::Hardlink => fs::hard_link(src, dst).map_err(entry_err),
    ReplicateMode::Softlink => symlink_dir(src, dst).map_err(entry_err),
  }
}

fn replicate_zip(zip: &Path, dst: &Path, config: &ReplicateConfig) -> Result<(), ReplicateError> {
  let archive_err = |source| ReplicateError::Archive {
    path: zip.to_path_buf(),
    source,
  };
  let file = File::open(zip).map_err(|source| ReplicateError::Archive {
    path: zip.to_path_buf(),
    source: source.into(),
  })?;
  let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(archive_err)?;

  if config.remove_first {
    if config.paths.is_empty() {
      remove_all(dst)?;
    } else {
      for base in &config.paths {
        remove_all(&dst.join(base.trim_end_matches('/')))?;
      }
    }
  }

  let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
  let mut files: Vec<usize> = Vec::new();

  // Archives produced by packagers usually carry no directory entries, so
  // directories are derived from file names as well.
  for index in 0..archive.len() {
    let entry = archive.by_index_raw(index).map_err(archive_err)?;
    let name = entry.name();
    if !selected(name, &config.paths) {
      continue;
    }
    let relative = entry
      .enclosed_name()
      .ok_or_else(|| ReplicateError::UnsafeEntryName(name.to_string()))?;
    if entry.is_dir() {
      dirs.insert(relative);
    } else {
      if let Some(parent) = relative.parent() {
        dirs.insert(parent.to_path_buf());
      }
      files.push(index);
    }
  }

  debug!(
    zip = %zip.display(),
    dirs = dirs.len(),
    files = files.len(),
    "extracting from archive"
  );

  for dir in &dirs {
    let to = dst.join(dir);
    fs::create_dir_all(&to).map_err(|source| ReplicateError::CreateDir { path: to.clone(), source })?;
  }

  for index in files {
    let mut entry = archive.by_index(index).map_err(|source| ReplicateError::ArchiveEntry {
      name: format!("#{}", index),
      source,
    })?;
    let name = entry.name().to_string();
    let relative = entry
      .enclosed_name()
      .ok_or_else(|| ReplicateError::UnsafeEntryName(name.clone()))?;
    let to = dst.join(relative);
    if let Some(parent) = to.parent() {
      fs::create_dir_all(parent).map_err(|source| ReplicateError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    trace!(entry = %name, to = %to.display(), "extracting");
    let permissions = entry_permissions(entry.unix_mode());
    create_file(&mut entry, permissions, &to).map_err(|source| ReplicateError::Entry {
      src: PathBuf::from(&name),
      dst: to.clone(),
      source,
    })?;
  }

  Ok(())
}

fn selected(name: &str, paths: &[String]) -> bool {
  paths.is_empty() || paths.iter().any(|path| name.starts_with(path.as_str()))
}

#[cfg(unix)]
fn entry_permissions(mode: Option<u32>) -> Option<fs::Permissions> {
  use std::os::unix::fs::PermissionsExt;
  mode.map(|mode| fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn entry_permissions(_mode: Option<u32>) -> Option<fs::Permissions> {
  None
}

/// Common preparation for a replicated entry: its parent exists and, when
/// removing first, nothing is left at the path itself.
fn prepare(dst: &Path, config: &ReplicateConfig) -> Result<(), ReplicateError> {
  if let Some(dir) = dst.parent() {
    fs::create_dir_all(dir).map_err(|source| ReplicateError::CreateDir {
      path: dir.to_path_buf(),
      source,
    })?;
  }
  if config.remove_first {
    let _ = fs::remove_file(dst);
  }
  Ok(())
}

/// Write everything from `input` to a new file at `dst` and apply `permissions`.
fn create_file(mut input: impl Read, permissions: Option<fs::Permissions>, dst: &Path) -> io::Result<()> {
  let mut out = File::create(dst)?;
  io::copy(&mut input, &mut out)?;
  drop(out);
  match permissions {
    Some(permissions) => fs::set_permissions(dst, permissions),
    None => Ok(()),
  }
}

/// Remove whatever is at `path`: a tree, a file, or a link. Missing is fine.
fn remove_all(path: &Path) -> Result<(), ReplicateError> {
  let result = match fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
    Ok(_) => fs::remove_file(path),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  };
  result.map_err(|source| ReplicateError::Remove {
    path: path.to_path_buf(),
    source,
  })
}

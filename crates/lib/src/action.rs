//! Build-action API used by the provisioner.
//!
//! The provisioner never spawns processes itself. It declares output paths
//! and hands [`ActionRequest`]s to an [`Actions`] implementation, which is
//! the build orchestrator in production. Two implementations live here:
//!
//! - [`LocalActions`]: runs requests immediately on this machine
//! - [`PlannedActions`]: records requests without running anything

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ActionError {
  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create output directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to start {mnemonic} action ({executable}): {source}")]
  Spawn {
    mnemonic: String,
    executable: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{mnemonic} action failed with exit code {code:?}")]
  Failed { mnemonic: String, code: Option<i32> },
}

/// A single build step: one executable run over declared inputs and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRequest {
  /// Short action kind shown in progress output, e.g. `GoStdlib`.
  pub mnemonic: String,
  pub executable: PathBuf,
  pub arguments: Vec<String>,
  pub inputs: Vec<PathBuf>,
  pub outputs: Vec<PathBuf>,
  /// Variables set for the executable, on top of whatever the executor provides.
  pub env: BTreeMap<String, String>,
}

/// Facilities a build orchestrator offers to the provisioner.
pub trait Actions {
  /// Declare an output directory and return its path.
  fn declare_directory(&mut self, name: &str) -> PathBuf;

  /// Declare an output file and return its path.
  fn declare_file(&mut self, name: &str) -> PathBuf;

  /// Materialize a declared file with fixed content.
  fn write_file(&mut self, path: &Path, content: &[u8]) -> Result<(), ActionError>;

  /// Execute (or schedule) an action.
  fn run(&mut self, request: ActionRequest) -> Result<(), ActionError>;
}

/// Runs actions directly, with declared outputs placed under a root directory.
#[derive(Debug)]
pub struct LocalActions {
  root: PathBuf,
  directories: BTreeSet<PathBuf>,
}

impl LocalActions {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      directories: BTreeSet::new(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

impl Actions for LocalActions {
  fn declare_directory(&mut self, name: &str) -> PathBuf {
    let path = self.root.join(name);
    self.directories.insert(path.clone());
    path
  }

  fn declare_file(&mut self, name: &str) -> PathBuf {
    self.root.join(name)
  }

  fn write_file(&mut self, path: &Path, content: &[u8]) -> Result<(), ActionError> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(|source| ActionError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    fs::write(path, content).map_err(|source| ActionError::Write {
      path: path.to_path_buf(),
      source,
    })
  }

  fn run(&mut self, request: ActionRequest) -> Result<(), ActionError> {
    info!(mnemonic = %request.mnemonic, outputs = request.outputs.len(), "running action");

    for output in &request.outputs {
      // Directories must exist up front; files only need their parent.
      let dir = if self.directories.contains(output) {
        Some(output.as_path())
      } else {
        output.parent()
      };
      if let Some(dir) = dir {
        fs::create_dir_all(dir).map_err(|source| ActionError::CreateDir {
          path: dir.to_path_buf(),
          source,
        })?;
      }
    }

    debug!(executable = %request.executable.display(), args = ?request.arguments, "spawning action");
    let status = Command::new(&request.executable)
      .args(&request.arguments)
      .envs(&request.env)
      .status()
      .map_err(|source| ActionError::Spawn {
        mnemonic: request.mnemonic.clone(),
        executable: request.executable.clone(),
        source,
      })?;

    if !status.success() {
      return Err(ActionError::Failed {
        mnemonic: request.mnemonic,
        code: status.code(),
      });
    }
    Ok(())
  }
}

/// Records what a provisioning run would do.
#[derive(Debug, Default, Serialize)]
pub struct PlannedActions {
  pub root: PathBuf,
  /// Files written eagerly, with their contents.
  pub files: BTreeMap<PathBuf, String>,
  pub actions: Vec<ActionRequest>,
}

impl PlannedActions {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      ..Default::default()
    }
  }
}

impl Actions for PlannedActions {
  fn declare_directory(&mut self, name: &str) -> PathBuf {
    self.root.join(name)
  }

  fn declare_file(&mut self, name: &str) -> PathBuf {
    self.root.join(name)
  }

  fn write_file(&mut self, path: &Path, content: &[u8]) -> Result<(), ActionError> {
    self
      .files
      .insert(path.to_path_buf(), String::from_utf8_lossy(content).into_owned());
    Ok(())
  }

  fn run(&mut self, request: ActionRequest) -> Result<(), ActionError> {
    self.actions.push(request);
    Ok(())
  }
}

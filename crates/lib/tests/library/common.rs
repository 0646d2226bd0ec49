//! Shared fixtures for the library integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use gostd_lib::platform::Platform;
use gostd_lib::platform::arch::Arch;
use gostd_lib::platform::os::Os;

pub fn native() -> Platform {
  Platform::new(Os::Linux, Arch::Amd64)
}

pub fn write(path: &Path, content: &str) {
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::write(path, content).unwrap();
}

/// Lay out a small SDK for `native()` under `root`.
pub fn fake_sdk(root: &Path) {
  write(&root.join("ROOT"), "");
  write(&root.join("VERSION"), "go1.22.0\n");
  write(&root.join("bin/go"), "#!/bin/sh\n");
  write(&root.join("packages.txt"), "fmt\nruntime\n");
  write(&root.join("src/fmt/print.go"), "package fmt\n");
  write(&root.join("src/runtime/proc.go"), "package runtime\n");
  write(&root.join("src/runtime/cgo/cgo.go"), "package cgo\n");
  write(&root.join("pkg/include/textflag.h"), "#define NOSPLIT 4\n");
  write(&root.join("pkg/tool/linux_amd64/compile"), "#!/bin/sh\n");
  write(&root.join("pkg/tool/linux_amd64/link"), "#!/bin/sh\n");
  write(&root.join("pkg/linux_amd64/fmt.a"), "!<arch>\n");
  write(&root.join("misc/cgo/README"), "unused\n");
}

/// Relative paths of every file below `root`, sorted.
pub fn tree(root: &Path) -> Vec<PathBuf> {
  let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
    .into_iter()
    .map(|entry| entry.unwrap())
    .filter(|entry| !entry.file_type().is_dir())
    .map(|entry| entry.path().strip_prefix(root).unwrap().to_path_buf())
    .collect();
  files.sort();
  files
}

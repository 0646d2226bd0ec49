//! Staging SDK trees from the filesystem and from packaged archives.

use std::fs;
use std::path::{Path, PathBuf};

use gostd_lib::archive::{ArchiveEntry, package_entries};
use gostd_lib::builder::STDLIB_PATHS;
use gostd_lib::replicate::{ReplicateConfig, replicate};
use gostd_lib::sdk::Sdk;
use tempfile::TempDir;

use super::common::{fake_sdk, native, tree, write};

fn stdlib_config() -> ReplicateConfig {
  ReplicateConfig::new().with_paths(STDLIB_PATHS.iter().copied())
}

/// Package every SDK input the way the packaging action would.
fn package_sdk(sdk: &Sdk, out: &Path) {
  let entries: Vec<ArchiveEntry> = sdk
    .inputs()
    .into_iter()
    .map(|path| {
      let name = path
        .strip_prefix(sdk.root())
        .unwrap()
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
      ArchiveEntry { name, path }
    })
    .collect();
  package_entries(out, &entries).unwrap();
}

#[test]
fn stages_only_the_stdlib_directories() {
  let temp = TempDir::new().unwrap();
  let sdk = temp.path().join("sdk");
  fake_sdk(&sdk);
  let goroot = temp.path().join("goroot");

  replicate(&sdk, &goroot, &stdlib_config()).unwrap();

  assert_eq!(
    tree(&goroot),
    vec![
      PathBuf::from("pkg/include/textflag.h"),
      PathBuf::from("pkg/tool/linux_amd64/compile"),
      PathBuf::from("pkg/tool/linux_amd64/link"),
      PathBuf::from("src/fmt/print.go"),
      PathBuf::from("src/runtime/cgo/cgo.go"),
      PathBuf::from("src/runtime/proc.go"),
    ]
  );
}

#[test]
fn archive_staging_matches_filesystem_staging() {
  let temp = TempDir::new().unwrap();
  let sdk_root = temp.path().join("sdk");
  fake_sdk(&sdk_root);
  let sdk = Sdk::discover(&sdk_root, native(), None).unwrap();
  let archive = temp.path().join("sdk.zip");
  package_sdk(&sdk, &archive);

  let from_fs = temp.path().join("from_fs");
  let from_zip = temp.path().join("from_zip");
  replicate(&sdk_root, &from_fs, &stdlib_config()).unwrap();
  replicate(Path::new(""), &from_zip, &stdlib_config().with_zip(&archive)).unwrap();

  assert_eq!(tree(&from_fs), tree(&from_zip));
  for file in tree(&from_fs) {
    assert_eq!(
      fs::read(from_fs.join(&file)).unwrap(),
      fs::read(from_zip.join(&file)).unwrap(),
      "{} differs",
      file.display()
    );
  }
}

#[test]
fn archive_staging_can_include_bin() {
  let temp = TempDir::new().unwrap();
  let sdk_root = temp.path().join("sdk");
  fake_sdk(&sdk_root);
  let sdk = Sdk::discover(&sdk_root, native(), None).unwrap();
  let archive = temp.path().join("sdk.zip");
  package_sdk(&sdk, &archive);

  let goroot = temp.path().join("goroot");
  let config = ReplicateConfig::new()
    .with_paths(STDLIB_PATHS.iter().copied().chain(["bin"]))
    .with_zip(&archive);
  replicate(Path::new(""), &goroot, &config).unwrap();

  assert!(goroot.join("bin/go").is_file());
  assert!(!goroot.join("ROOT").exists());
  assert!(!goroot.join("misc").exists());
}

#[test]
fn restaging_prunes_files_removed_from_source() {
  let temp = TempDir::new().unwrap();
  let sdk = temp.path().join("sdk");
  fake_sdk(&sdk);
  let goroot = temp.path().join("goroot");

  replicate(&sdk, &goroot, &stdlib_config()).unwrap();
  let first = tree(&goroot);
  replicate(&sdk, &goroot, &stdlib_config()).unwrap();
  assert_eq!(tree(&goroot), first);

  fs::remove_file(sdk.join("src/runtime/proc.go")).unwrap();
  replicate(&sdk, &goroot, &stdlib_config()).unwrap();

  assert!(!goroot.join("src/runtime/proc.go").exists());
  assert!(goroot.join("src/fmt/print.go").exists());
}

#[test]
fn archive_restaging_clears_filtered_directories() {
  let temp = TempDir::new().unwrap();
  let sdk_root = temp.path().join("sdk");
  fake_sdk(&sdk_root);
  let sdk = Sdk::discover(&sdk_root, native(), None).unwrap();
  let archive = temp.path().join("sdk.zip");
  package_sdk(&sdk, &archive);

  let goroot = temp.path().join("goroot");
  write(&goroot.join("src/stale.go"), "package stale\n");
  write(&goroot.join("keep.txt"), "outside the filters\n");

  replicate(Path::new(""), &goroot, &stdlib_config().with_zip(&archive)).unwrap();

  assert!(!goroot.join("src/stale.go").exists());
  assert!(goroot.join("keep.txt").exists());
  assert!(goroot.join("src/fmt/print.go").exists());
}

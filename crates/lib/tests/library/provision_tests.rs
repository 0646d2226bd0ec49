//! Provisioning against a discovered SDK.

use std::path::{Path, PathBuf};

use gostd_lib::action::{Actions, LocalActions, PlannedActions};
use gostd_lib::mode::{LinkMode, PlatformMode};
use gostd_lib::platform::arch::Arch;
use gostd_lib::platform::os::Os;
use gostd_lib::sdk::{CcToolchain, Sdk};
use gostd_lib::stdlib::{PACKAGE_MNEMONIC, Packager, ProvisionContext, ProvisionError, STDLIB_MNEMONIC, provision};
use tempfile::TempDir;

use super::common::{fake_sdk, native};

fn discovered(temp: &TempDir) -> Sdk {
  let root = temp.path().join("sdk");
  fake_sdk(&root);
  Sdk::discover(&root, native(), None).unwrap()
}

fn gcc() -> CcToolchain {
  CcToolchain {
    compiler_path: PathBuf::from("/usr/bin/gcc"),
    compile_options: vec!["-O2".to_string()],
    link_options: Vec::new(),
    files: vec![PathBuf::from("/usr/bin/gcc")],
  }
}

#[test]
fn host_configuration_reuses_sdk_archives() {
  let temp = TempDir::new().unwrap();
  let sdk = discovered(&temp);
  let mut ctx = ProvisionContext::new(PlatformMode::new(Os::Linux, Arch::Amd64), sdk.clone(), "/bin/gostd");
  ctx.cc = Some(gcc());
  let mut plan = PlannedActions::new(temp.path().join("out"));

  let stdlib = provision(&ctx, &mut plan).unwrap();

  assert_eq!(stdlib.root_file, sdk.root_file);
  assert_eq!(stdlib.libs, vec![sdk.root().join("pkg/linux_amd64/fmt.a")]);
  assert!(plan.actions.is_empty());
}

#[test]
fn every_non_native_mode_plans_exactly_one_build() {
  let temp = TempDir::new().unwrap();
  let sdk = discovered(&temp);
  let base = PlatformMode::new(Os::Linux, Arch::Amd64);
  let modes = [
    PlatformMode::new(Os::Windows, Arch::Amd64),
    base.with_race(true),
    base.with_msan(true),
    base.with_pure(true),
    base.with_link(LinkMode::Pie),
    base.with_link(LinkMode::Plugin),
  ];

  for mode in modes {
    let mut ctx = ProvisionContext::new(mode, sdk.clone(), "/bin/gostd");
    ctx.cc = Some(gcc());
    let mut plan = PlannedActions::new("/out");

    let stdlib = provision(&ctx, &mut plan).unwrap();

    assert_eq!(plan.actions.len(), 1, "{:?}", mode);
    let action = &plan.actions[0];
    assert_eq!(action.mnemonic, STDLIB_MNEMONIC);
    assert!(action.inputs.contains(&sdk.package_list));
    assert!(action.inputs.contains(&sdk.go));
    assert_eq!(stdlib.root_file, PathBuf::from("/out/stdlib_/ROOT"));
  }
}

#[test]
fn remote_build_ships_one_archive() {
  let temp = TempDir::new().unwrap();
  let sdk = discovered(&temp);
  let mut ctx = ProvisionContext::new(PlatformMode::new(Os::Darwin, Arch::Arm64).with_pure(true), sdk.clone(), "/bin/gostd");
  ctx.packager = Some(Packager {
    executable: PathBuf::from("/bin/gostd"),
    leading_args: vec!["pack".to_string()],
  });
  let mut plan = PlannedActions::new("/out");

  provision(&ctx, &mut plan).unwrap();

  let [pack, build] = plan.actions.as_slice() else {
    panic!("expected two actions, got {:?}", plan.actions);
  };
  assert_eq!(pack.mnemonic, PACKAGE_MNEMONIC);
  let params = PathBuf::from("/out/stdlib_/sdk.zip.params");
  assert_eq!(pack.arguments.last(), Some(&format!("-param={}", params.display())));
  assert_eq!(pack.inputs[..pack.inputs.len() - 1], sdk.inputs()[..]);
  let entries = &plan.files[&params];
  assert!(entries.contains(&format!("src/fmt/print.go={}\n", sdk.root().join("src/fmt/print.go").display())));
  assert!(entries.contains(&format!("ROOT={}\n", sdk.root_file.display())));

  let archive = PathBuf::from("/out/stdlib_/sdk.zip");
  assert_eq!(build.inputs, vec![archive, sdk.package_list.clone()]);
}

#[test]
fn packaging_failure_stops_provisioning() {
  struct FailingPackager(PlannedActions);

  impl Actions for FailingPackager {
    fn declare_directory(&mut self, name: &str) -> PathBuf {
      self.0.declare_directory(name)
    }

    fn declare_file(&mut self, name: &str) -> PathBuf {
      self.0.declare_file(name)
    }

    fn write_file(&mut self, path: &Path, content: &[u8]) -> Result<(), gostd_lib::action::ActionError> {
      self.0.write_file(path, content)
    }

    fn run(&mut self, request: gostd_lib::action::ActionRequest) -> Result<(), gostd_lib::action::ActionError> {
      if request.mnemonic == PACKAGE_MNEMONIC {
        return Err(gostd_lib::action::ActionError::Failed {
          mnemonic: request.mnemonic,
          code: Some(1),
        });
      }
      self.0.run(request)
    }
  }

  let temp = TempDir::new().unwrap();
  let mut ctx = ProvisionContext::new(
    PlatformMode::new(Os::Linux, Arch::Amd64).with_pure(true),
    discovered(&temp),
    "/bin/gostd",
  );
  ctx.packager = Some(Packager {
    executable: PathBuf::from("/bin/gostd"),
    leading_args: Vec::new(),
  });
  let mut actions = FailingPackager(PlannedActions::new("/out"));

  let err = provision(&ctx, &mut actions).unwrap_err();

  assert!(matches!(err, ProvisionError::Action(_)));
  assert!(actions.0.actions.is_empty());
}

#[cfg(unix)]
#[test]
fn local_build_sees_root_marker_and_environment() {
  use std::fs;
  use std::os::unix::fs::PermissionsExt;

  let temp = TempDir::new().unwrap();
  let sdk = discovered(&temp);
  let out = temp.path().join("out");
  let record = temp.path().join("record.txt");

  // Stands in for the builder: checks the marker and records what it was given.
  let builder = temp.path().join("builder.sh");
  fs::write(
    &builder,
    format!(
      "#!/bin/sh\ntest -f '{root}' || exit 9\nprintf '%s %s %s\\n' \"$GOOS\" \"$CGO_ENABLED\" \"$*\" > '{record}'\n",
      root = out.join("stdlib_/ROOT").display(),
      record = record.display(),
    ),
  )
  .unwrap();
  fs::set_permissions(&builder, fs::Permissions::from_mode(0o755)).unwrap();

  let ctx = ProvisionContext::new(PlatformMode::new(Os::Linux, Arch::Arm64).with_pure(true), sdk, &builder);
  let mut actions = LocalActions::new(&out);

  let stdlib = provision(&ctx, &mut actions).unwrap();

  assert_eq!(stdlib.root_file, out.join("stdlib_/ROOT"));
  assert!(out.join("stdlib_/pkg").is_dir());
  assert!(out.join("stdlib_/src").is_dir());
  let recorded = fs::read_to_string(&record).unwrap();
  assert!(recorded.starts_with("linux 0 stdlib --sdk "), "{}", recorded);
  assert!(recorded.contains("--installsuffix linux_arm64 "));
  assert!(recorded.trim_end().ends_with("--package std"));
}

//! gostd-lib: Go standard library provisioning for hermetic builds
//!
//! This crate decides whether a Go SDK's precompiled standard library can be
//! reused for a target configuration and, when it cannot, describes and runs
//! the build that produces a fresh one:
//! - `stdlib::provision`: reuse-or-rebuild decision and build-action requests
//! - `replicate`: staging SDK trees (or zip archives of them) into a new GOROOT
//! - `env`: the context shared by builder verbs (SDK paths, scratch dir, subprocesses)
//! - `builder`: the verbs executed inside build actions

pub mod action;
pub mod archive;
pub mod args;
pub mod builder;
pub mod env;
pub mod mode;
pub mod platform;
pub mod replicate;
pub mod sdk;
pub mod stdlib;
pub mod util;

//! Integration tests for gostd-lib.

mod common;
mod provision_tests;
mod replicate_tests;

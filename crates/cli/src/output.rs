//! Terminal output for gostd commands.
//!
//! Builder verbs run inside build actions where stdout may belong to a
//! wrapped tool, so only the user-facing commands print status lines, and
//! errors always go to stderr.

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

/// Kind of status line; decides its symbol, color and stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Success,
  Info,
  Error,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Self::Success => "✓",
      Self::Info => "•",
      Self::Error => "✗",
    }
  }
}

pub fn print_status(status: Status, message: &str) {
  let symbol = status.symbol();
  match status {
    Status::Success => println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.green()), message),
    Status::Info => println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.blue()), message),
    Status::Error => eprintln!(
      "{} {}",
      symbol.if_supports_color(Stream::Stderr, |s| s.red()),
      message.if_supports_color(Stream::Stderr, |s| s.red())
    ),
  }
}

/// Print an indented `label: value` line.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

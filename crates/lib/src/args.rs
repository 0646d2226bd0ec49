//! Command-line argument utilities shared by the builder verbs.
//!
//! - `read_params_files()`: expands `-param=<file>` tokens in place
//! - `split_args()`: separates builder arguments from wrapped-tool arguments
//! - `abs()` / `abs_args()`: make path-valued flag arguments absolute
//! - `split_quoted()`: word splitting for flag strings such as `CGO_LDFLAGS`

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Token prefix whose value names a file of newline-separated arguments.
pub const PARAM_FILE_PREFIX: &str = "-param=";

/// Paths beginning with this prefix are resolved later by a compiler wrapper
/// and must be passed through untouched.
pub const WRAPPER_PATH_PREFIX: &str = "__BAZEL_";

/// CGO environment variables whose path-valued flags must be absolute.
pub const CGO_ENV_VARS: &[&str] = &["CGO_CFLAGS", "CGO_CXXFLAGS", "CGO_CPPFLAGS", "CGO_LDFLAGS"];

/// Flags inside [`CGO_ENV_VARS`] that take a path value.
pub const CGO_ABS_ENV_FLAGS: &[&str] = &[
  "-I",
  "-L",
  "-isysroot",
  "-isystem",
  "-iquote",
  "-include",
  "-gcc-toolchain",
  "--sysroot",
];

#[derive(Debug, Error)]
pub enum ArgsError {
  #[error("failed to read params file {path}: {source}")]
  ReadParams {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("unterminated quoted string in {0:?}")]
  UnterminatedQuote(String),
}

/// Replace every `-param=<file>` argument with the lines of `<file>`.
///
/// Each line of the file becomes one argument. A single trailing empty line
/// (the file's final newline) is ignored; other blank lines are kept.
pub fn read_params_files(args: &[String]) -> Result<Vec<String>, ArgsError> {
  if !args.iter().any(|arg| arg.starts_with(PARAM_FILE_PREFIX)) {
    return Ok(args.to_vec());
  }

  let mut expanded = Vec::with_capacity(args.len());
  for arg in args {
    let Some(file) = arg.strip_prefix(PARAM_FILE_PREFIX) else {
      expanded.push(arg.clone());
      continue;
    };
    let content = std::fs::read_to_string(file).map_err(|source| ArgsError::ReadParams {
      path: PathBuf::from(file),
      source,
    })?;
    let mut lines: Vec<&str> = content.split('\n').collect();
    if lines.last() == Some(&"") {
      lines.pop();
    }
    expanded.extend(lines.into_iter().map(str::to_string));
  }
  Ok(expanded)
}

/// Split arguments at the first `--` into builder arguments and tool arguments.
///
/// Without a `--` every argument belongs to the builder.
pub fn split_args(args: &[String]) -> (&[String], &[String]) {
  match args.iter().position(|arg| arg == "--") {
    Some(i) => (&args[..i], &args[i + 1..]),
    None => (args, &[]),
  }
}

/// Returns the absolute form of `path`.
///
/// Relative paths that are long on Windows break several Go tools, while the
/// same absolute path works. Values starting with [`WRAPPER_PATH_PREFIX`] are
/// returned unchanged, as is anything that cannot be resolved.
pub fn abs(path: &str) -> String {
  if path.starts_with(WRAPPER_PATH_PREFIX) {
    return path.to_string();
  }
  match std::path::absolute(Path::new(path)) {
    Ok(abs) => abs.to_string_lossy().into_owned(),
    Err(_) => path.to_string(),
  }
}

/// Make the value of every flag in `flags` absolute.
///
/// Handles the three spellings compilers accept: `-Ipath`, `-I=path` and
/// `-I path` (value in the next argument). Only values of listed flags change.
pub fn abs_args(args: &mut [String], flags: &[&str]) {
  let mut abs_next = false;
  for arg in args.iter_mut() {
    if abs_next {
      *arg = abs(arg);
      abs_next = false;
      continue;
    }
    for flag in flags {
      let Some(value) = arg.strip_prefix(flag) else {
        continue;
      };
      if value.is_empty() {
        abs_next = true;
        break;
      }
      let (separator, value) = match value.strip_prefix('=') {
        Some(rest) => ("=", rest),
        None => ("", value),
      };
      *arg = format!("{}{}{}", flag, separator, abs(value));
      break;
    }
  }
}

/// Split `s` into words the way a POSIX shell would, without expansions.
///
/// Single quotes preserve everything literally, double quotes allow
/// backslash escapes, and an unquoted backslash escapes the next character.
pub fn split_quoted(s: &str) -> Result<Vec<String>, ArgsError> {
  let mut words = Vec::new();
  let mut current = String::new();
  let mut in_word = false;
  let mut quote: Option<char> = None;
  let mut escaped = false;

  for c in s.chars() {
    if escaped {
      current.push(c);
      escaped = false;
      in_word = true;
      continue;
    }
    match (quote, c) {
      (Some('\''), '\'') | (Some('"'), '"') => quote = None,
      (Some('\''), _) => current.push(c),
      (_, '\\') => escaped = true,
      (Some(_), _) => current.push(c),
      (None, '\'' | '"') => {
        quote = Some(c);
        in_word = true;
      }
      (None, c) if c.is_whitespace() => {
        if in_word {
          words.push(std::mem::take(&mut current));
          in_word = false;
        }
      }
      (None, _) => {
        current.push(c);
        in_word = true;
      }
    }
  }

  if quote.is_some() || escaped {
    return Err(ArgsError::UnterminatedQuote(s.to_string()));
  }
  if in_word {
    words.push(current);
  }
  Ok(words)
}

/// Quote `s` when it contains a space so it can be pasted into a shell.
pub fn quote_if_needed(s: &str) -> String {
  if s.contains(' ') { format!("{:?}", s) } else { s.to_string() }
}

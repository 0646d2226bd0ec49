mod cmd;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{PackArgs, ProvisionArgs, StdlibCmdArgs};
use gostd_lib::args::{read_params_files, split_args};
use output::{Status, print_status};

/// gostd - Go standard library provisioning for hermetic builds
#[derive(Parser)]
#[command(name = "gostd")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output (debug logs, subcommand lines)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the standard library into a new GOROOT
  Stdlib(StdlibCmdArgs),

  /// Package files into a zip archive
  Pack(PackArgs),

  /// Run a Go tool with its build ID blanked (for -toolexec)
  Filterbuildid,

  /// Reuse or rebuild the standard library for a target configuration
  Provision(ProvisionArgs),

  /// Display host platform information
  Info,
}

fn main() {
  if let Err(e) = run() {
    print_status(Status::Error, &format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run() -> Result<()> {
  let mut argv = std::env::args();
  let program = argv.next().unwrap_or_else(|| "gostd".to_string());
  let rest: Vec<String> = argv.collect();

  let expanded = read_params_files(&rest).context("Failed to expand params files")?;
  let (builder_args, tool_args) = split_args(&expanded);
  let cli = Cli::parse_from(std::iter::once(&program).chain(builder_args));

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Stdlib(args) => cmd::cmd_stdlib(args, tool_args, cli.verbose),
    Commands::Pack(args) => cmd::cmd_pack(args),
    Commands::Filterbuildid => cmd::cmd_filterbuildid(tool_args),
    Commands::Provision(args) => cmd::cmd_provision(args, cli.verbose),
    Commands::Info => {
      cmd::cmd_info();
      Ok(())
    }
  }
}

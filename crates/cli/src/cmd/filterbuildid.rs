use anyhow::Result;

use gostd_lib::builder::filterbuildid;

/// Stdout belongs to the wrapped tool; the go command parses it.
pub fn cmd_filterbuildid(tool_args: &[String]) -> Result<()> {
  filterbuildid(tool_args)?;
  Ok(())
}

mod filterbuildid;
mod info;
mod pack;
mod provision;
mod stdlib;

pub use filterbuildid::cmd_filterbuildid;
pub use info::cmd_info;
pub use pack::{PackArgs, cmd_pack};
pub use provision::{ProvisionArgs, cmd_provision};
pub use stdlib::{StdlibCmdArgs, cmd_stdlib};

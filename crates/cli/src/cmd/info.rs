use gostd_lib::platform::platform_pair;

use crate::output::print_stat;

pub fn cmd_info() {
  println!("System:");
  match platform_pair() {
    Some(pair) => print_stat("Platform", &pair),
    None => println!("Could not detect platform."),
  }
}

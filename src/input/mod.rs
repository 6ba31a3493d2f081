//! Console input
//!
//! The program is driven by line commands typed on stdin.

pub mod commands;
pub mod lines;

pub use commands::{parse_command, Command, HELP};
pub use lines::{ConsoleInput, LineReader};

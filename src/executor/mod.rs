//! Script execution module
//!
//! This module handles launching scripts:
//! - Building per-OS launch commands (background, foreground, terminal)
//! - Spawning without blocking and reporting completion on a channel
//! - Capturing output for failure reports
//! - Revealing a script in the system file manager

mod command;
mod output_buffer;
mod runner;

pub use command::{
    build_command, build_command_with, which_lookup, LaunchCommand, LaunchStrategy,
    TerminalLookup, LINUX_TERMINALS, UNBUFFERED_ENV,
};
pub use output_buffer::{spawn_output_reader, Echo, OutputBuffer};
pub use runner::{
    reveal_in_file_manager, Dispatcher, LaunchHandle, LaunchOutcome, LaunchReport, LaunchState,
};

#[cfg(test)]
pub(crate) use command::{applescript_escape, linux_shell_line, shell_quote};

#[cfg(test)]
#[path = "../executor_tests.rs"]
mod tests;

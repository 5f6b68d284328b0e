//! Library side of the `recall` binary.
//!
//! - `cli`: command-line parsing with clap
//! - `commands`: configuration, logging and command execution

pub mod cli;
pub mod commands;

pub use cli::{CacheCommands, Cli, Commands, PrefsCommands, ThreadCommands, ToolsCommands};
pub use commands::{execute, init_logging, load_settings, open_context, run_maintenance, seed};

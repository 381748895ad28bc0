//! CLI module for logbook
//!
//! This module contains all CLI command handlers and utilities.

mod args;
mod commands;
mod logging;

pub use args::{Cli, Command, DiffArgs, ExportArgs, OutputFormat, RunsArgs, ShowArgs};
pub use commands::run_command;
pub use logging::{init_tracing, log, LogLevel};

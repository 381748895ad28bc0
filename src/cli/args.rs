//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Logbook: structured experiment logs
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "logbook")]
#[command(author = "PAIML")]
#[command(version)]
#[command(about = "Inspect, compare and export experiments recorded as JSON-lines logs")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (also reports malformed log lines)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Summarize one experiment
    Show(ShowArgs),

    /// Parse an experiment and write it to an experiment store directory
    Export(ExportArgs),

    /// List the experiments under a root directory
    Runs(RunsArgs),

    /// Compare the effective configs of two experiments
    Diff(DiffArgs),
}

/// Arguments for the show command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ShowArgs {
    /// Log directory or glob pattern
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Group metric rows by the value of this key
    #[arg(short, long, value_name = "KEY")]
    pub group_by: Option<String>,
}

/// Arguments for the export command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ExportArgs {
    /// Log directory or glob pattern
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Destination directory
    #[arg(short, long)]
    pub out: PathBuf,

    /// Group metric rows by the value of this key
    #[arg(short, long, value_name = "KEY")]
    pub group_by: Option<String>,
}

/// Arguments for the runs command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct RunsArgs {
    /// Directory holding one sub-directory per run
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the diff command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct DiffArgs {
    /// First experiment
    #[arg(value_name = "FIRST")]
    pub first: PathBuf,

    /// Second experiment
    #[arg(value_name = "SECOND")]
    pub second: PathBuf,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {s}. Valid formats: text, json")),
        }
    }
}

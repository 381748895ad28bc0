//! Logbook CLI
//!
//! Inspect experiments recorded as JSON-lines logs.
//!
//! # Usage
//!
//! ```bash
//! # Summarize one run
//! logbook show runs/3
//!
//! # Group metric rows by mode, as JSON
//! logbook show "runs/3/*.jsonl" --group-by mode --format json
//!
//! # Write a run to an experiment store directory
//! logbook export runs/3 --out store/3
//!
//! # List every run under a root
//! logbook runs runs/
//!
//! # Compare effective configs
//! logbook diff runs/3 runs/4
//! ```

use clap::Parser;
use logbook::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

//! CLI command implementations

mod diff;
mod export;
mod runs;
mod show;

#[cfg(test)]
mod tests;

use crate::cli::{init_tracing, Cli, Command, LogLevel};
use crate::experiment::{ExperimentParser, MetricGrouping};
use crate::parser::ErrorPolicy;

/// Execute a CLI command based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<(), String> {
    let log_level = LogLevel::from_flags(cli.verbose, cli.quiet);
    init_tracing(log_level);

    match cli.command {
        Command::Show(args) => show::run_show(args, log_level),
        Command::Export(args) => export::run_export(args, log_level),
        Command::Runs(args) => runs::run_runs(args, log_level),
        Command::Diff(args) => diff::run_diff(args, log_level),
    }
}

/// Experiment parser configured from common flags.
///
/// Verbose runs report malformed lines instead of skipping them silently.
fn experiment_parser(group_by: Option<&str>, log_level: LogLevel) -> ExperimentParser {
    let mut parser = ExperimentParser::new();
    if let Some(key) = group_by {
        parser = parser.group_by(MetricGrouping::by_key(key));
    }
    if log_level == LogLevel::Verbose {
        parser = parser.with_policy(ErrorPolicy::Verbose);
    }
    parser
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

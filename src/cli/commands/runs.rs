//! Runs command: list the experiments under a root directory

use serde::Serialize;
use serde_json::Value;

use super::{experiment_parser, truncate};
use crate::cli::{LogLevel, OutputFormat, RunsArgs};
use crate::experiment::Experiment;
use crate::record::LOGBOOK_ID;

#[derive(Debug, Serialize)]
struct RunSummary {
    run_id: Option<String>,
    configs: usize,
    metric_rows: usize,
    info_records: usize,
}

/// The id stamped into the run's records, looked up in configs, then
/// metrics, then info.
fn run_id(experiment: &Experiment) -> Option<String> {
    let from_config = experiment
        .configs
        .iter()
        .find_map(|c| c.get(LOGBOOK_ID).and_then(Value::as_str));
    let from_metrics = || {
        experiment.metrics.values().find_map(|table| {
            table
                .column(LOGBOOK_ID)?
                .iter()
                .find_map(Value::as_str)
        })
    };
    let from_info = || {
        experiment
            .info
            .values()
            .flatten()
            .find_map(|r| r.get(LOGBOOK_ID).and_then(Value::as_str))
    };
    from_config
        .or_else(from_metrics)
        .or_else(from_info)
        .map(str::to_string)
}

pub fn run_runs(args: RunsArgs, log_level: LogLevel) -> Result<(), String> {
    let sequence = experiment_parser(None, log_level)
        .parse_sequence(&args.root)
        .map_err(|e| format!("Failed to parse experiments: {e}"))?;

    let runs: Vec<RunSummary> = sequence
        .iter()
        .map(|experiment| RunSummary {
            run_id: run_id(experiment),
            configs: experiment.configs.len(),
            metric_rows: experiment.num_metric_rows(),
            info_records: experiment.info.values().map(Vec::len).sum(),
        })
        .collect();

    if runs.is_empty() {
        eprintln!("No experiments found in {}", args.root.display());
        return Ok(());
    }

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&runs)
                .map_err(|e| format!("JSON serialization failed: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            if log_level == LogLevel::Quiet {
                return Ok(());
            }
            println!("{:<24} {:>8} {:>12} {:>8}", "RUN", "CONFIGS", "METRIC ROWS", "INFO");
            println!("{}", "-".repeat(55));
            for run in &runs {
                println!(
                    "{:<24} {:>8} {:>12} {:>8}",
                    truncate(run.run_id.as_deref().unwrap_or("-"), 22),
                    run.configs,
                    run.metric_rows,
                    run.info_records,
                );
            }
            println!("\n{} run(s)", runs.len());
        }
    }

    Ok(())
}

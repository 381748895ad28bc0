//! Export command: parse logs into an experiment store directory

use super::experiment_parser;
use crate::cli::{log, ExportArgs, LogLevel};

pub fn run_export(args: ExportArgs, log_level: LogLevel) -> Result<(), String> {
    let experiment = experiment_parser(args.group_by.as_deref(), log_level)
        .parse(&args.path)
        .map_err(|e| format!("Failed to parse experiment: {e}"))?;

    experiment
        .serialize_to(&args.out)
        .map_err(|e| format!("Failed to write experiment: {e}"))?;

    log(
        log_level,
        LogLevel::Normal,
        &format!(
            "Exported {} config(s), {} metric group(s), {} info kind(s) to {}",
            experiment.configs.len(),
            experiment.metrics.len(),
            experiment.info.len(),
            args.out.display()
        ),
    );
    for (group, table) in &experiment.metrics {
        log(
            log_level,
            LogLevel::Verbose,
            &format!("  {group}: {} rows x {} columns", table.num_rows(), table.num_columns()),
        );
    }
    Ok(())
}

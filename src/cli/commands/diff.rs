//! Diff command: compare the effective configs of two experiments

use super::experiment_parser;
use crate::cli::{DiffArgs, LogLevel};
use crate::record::{compare_records, flatten, is_reserved, Fields, DEFAULT_SEPARATOR};

fn effective_config(path: &std::path::Path, log_level: LogLevel) -> Result<Fields, String> {
    let experiment = experiment_parser(None, log_level)
        .parse(path)
        .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?;
    Ok(experiment
        .config()
        .map(|c| {
            c.iter()
                .filter(|(key, _)| !is_reserved(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<Fields>()
        })
        .unwrap_or_default())
}

pub fn run_diff(args: DiffArgs, log_level: LogLevel) -> Result<(), String> {
    let first = effective_config(&args.first, log_level)?;
    let second = effective_config(&args.second, log_level)?;
    let diff = compare_records(&first, &second, DEFAULT_SEPARATOR);

    if log_level == LogLevel::Quiet {
        return Ok(());
    }
    if diff.is_empty() {
        println!("Configs are identical");
        return Ok(());
    }

    let first_flat = flatten(&first, DEFAULT_SEPARATOR);
    let second_flat = flatten(&second, DEFAULT_SEPARATOR);
    for key in &diff.different {
        println!("~ {key}: {} -> {}", first_flat[key.as_str()], second_flat[key.as_str()]);
    }
    for key in &diff.missing_in_second {
        println!("- {key}: {}", first_flat[key.as_str()]);
    }
    for key in &diff.missing_in_first {
        println!("+ {key}: {}", second_flat[key.as_str()]);
    }
    Ok(())
}

//! Show command: summarize one experiment

use std::collections::BTreeMap;

use serde::Serialize;

use super::{experiment_parser, truncate};
use crate::cli::{LogLevel, OutputFormat, ShowArgs};
use crate::experiment::Experiment;
use crate::record::{is_reserved, Fields};

#[derive(Debug, Serialize)]
struct GroupSummary {
    rows: usize,
    columns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExperimentSummary {
    configs: usize,
    config: Option<Fields>,
    metrics: BTreeMap<String, GroupSummary>,
    info: BTreeMap<String, usize>,
}

impl ExperimentSummary {
    fn new(experiment: &Experiment) -> Self {
        let config = experiment.config().map(|c| {
            c.iter()
                .filter(|(key, _)| !is_reserved(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<Fields>()
        });
        let metrics = experiment
            .metrics
            .iter()
            .map(|(group, table)| {
                let summary = GroupSummary {
                    rows: table.num_rows(),
                    columns: table.columns().to_vec(),
                };
                (group.clone(), summary)
            })
            .collect();
        let info = experiment
            .info
            .iter()
            .map(|(kind, records)| (kind.clone(), records.len()))
            .collect();
        Self {
            configs: experiment.configs.len(),
            config,
            metrics,
            info,
        }
    }
}

pub fn run_show(args: ShowArgs, log_level: LogLevel) -> Result<(), String> {
    let experiment = experiment_parser(args.group_by.as_deref(), log_level)
        .parse(&args.path)
        .map_err(|e| format!("Failed to parse experiment: {e}"))?;
    let summary = ExperimentSummary::new(&experiment);

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| format!("JSON serialization failed: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            if log_level == LogLevel::Quiet {
                return Ok(());
            }
            println!("Experiment: {}", args.path.display());
            println!("  Configs: {}", summary.configs);
            if let Some(config) = &summary.config {
                let json = serde_json::to_string(config)
                    .map_err(|e| format!("JSON serialization failed: {e}"))?;
                println!("  Config:  {}", truncate(&json, 100));
            }

            println!("\n  {:<20} {:>8} {:>8}", "GROUP", "ROWS", "COLUMNS");
            for (group, table) in &summary.metrics {
                println!(
                    "  {:<20} {:>8} {:>8}",
                    truncate(group, 20),
                    table.rows,
                    table.columns.len()
                );
            }

            if !summary.info.is_empty() {
                println!("\n  {:<20} {:>8}", "KIND", "RECORDS");
                for (kind, count) in &summary.info {
                    println!("  {:<20} {:>8}", truncate(kind, 20), count);
                }
            }
        }
    }

    Ok(())
}

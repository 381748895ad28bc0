//! CLI command tests

use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::cli::{DiffArgs, ExportArgs, OutputFormat, RunsArgs, ShowArgs};
use crate::dispatch::{make_config, LogBook};
use crate::experiment::Experiment;
use crate::record::Fields;

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}

/// Write a run with two configs and mode-tagged metrics.
fn write_run(dir: &Path, id: &str, lr: f64) -> PathBuf {
    let mut book = LogBook::new(make_config(id, "cli", Some(dir.to_path_buf()))).unwrap();
    book.write_config(&fields(json!({"lr": 1.0, "opt": "sgd"}))).unwrap();
    book.write_config(&fields(json!({"lr": lr, "opt": "sgd"}))).unwrap();
    book.write_metric(&fields(json!({"mode": "train", "loss": 0.4})))
        .unwrap();
    book.write_metric(&fields(json!({"mode": "eval", "acc": 0.8})))
        .unwrap();
    book.write_message("finished").unwrap();
    dir.to_path_buf()
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

#[test]
fn test_cli_parses_show() {
    let cli = Cli::try_parse_from(["logbook", "show", "runs/1", "--format", "json", "-g", "mode"])
        .unwrap();
    assert!(!cli.verbose);
    assert_eq!(
        cli.command,
        Command::Show(ShowArgs {
            path: PathBuf::from("runs/1"),
            format: OutputFormat::Json,
            group_by: Some("mode".into()),
        })
    );
}

#[test]
fn test_cli_global_flags() {
    let cli = Cli::try_parse_from(["logbook", "runs", "root", "-q"]).unwrap();
    assert!(cli.quiet);
    assert_eq!(LogLevel::from_flags(cli.verbose, cli.quiet), LogLevel::Quiet);
    assert_eq!(LogLevel::from_flags(true, false), LogLevel::Verbose);
    assert_eq!(LogLevel::from_flags(false, false), LogLevel::Normal);
}

#[test]
fn test_cli_rejects_unknown_format() {
    assert!(Cli::try_parse_from(["logbook", "show", "x", "--format", "xml"]).is_err());
    assert!(Cli::try_parse_from(["logbook", "export", "x"]).is_err());
}

#[test]
fn test_output_format_from_str() {
    assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
    assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
    let err = "csv".parse::<OutputFormat>().unwrap_err();
    assert!(err.contains("Valid formats"));
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a-very-long-run-name", 10), "a-very-...");
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[test]
fn test_show_text_and_json() {
    let dir = TempDir::new().unwrap();
    let path = write_run(dir.path(), "show-1", 0.1);

    for format in [OutputFormat::Text, OutputFormat::Json] {
        let args = ShowArgs {
            path: path.clone(),
            format,
            group_by: Some("mode".into()),
        };
        show::run_show(args, LogLevel::Normal).unwrap();
    }
}

#[test]
fn test_show_missing_path() {
    let args = ShowArgs {
        path: PathBuf::from("/no/such/run/*.jsonl"),
        format: OutputFormat::Text,
        group_by: None,
    };
    let err = show::run_show(args, LogLevel::Quiet).unwrap_err();
    assert!(err.contains("Failed to parse experiment"));
    assert!(err.contains("No log files matched"));
}

#[test]
fn test_export_writes_store() {
    let dir = TempDir::new().unwrap();
    let logs = write_run(&dir.path().join("logs"), "exp-1", 0.1);
    let out = dir.path().join("store");

    let args = ExportArgs {
        path: logs,
        out: out.clone(),
        group_by: Some("mode".into()),
    };
    export::run_export(args, LogLevel::Quiet).unwrap();

    let restored = Experiment::deserialize_from(&out).unwrap();
    assert_eq!(restored.configs.len(), 2);
    assert_eq!(restored.metrics.keys().collect::<Vec<_>>(), vec!["eval", "train"]);
    assert_eq!(restored.info_records("message").len(), 1);
}

#[test]
fn test_runs_lists_sub_directories() {
    let root = TempDir::new().unwrap();
    write_run(&root.path().join("a"), "run-a", 0.1);
    write_run(&root.path().join("b"), "run-b", 0.2);

    for format in [OutputFormat::Text, OutputFormat::Json] {
        let args = RunsArgs {
            root: root.path().to_path_buf(),
            format,
        };
        runs::run_runs(args, LogLevel::Quiet).unwrap();
    }
}

#[test]
fn test_runs_missing_root() {
    let args = RunsArgs {
        root: PathBuf::from("/no/such/root"),
        format: OutputFormat::Text,
    };
    assert!(runs::run_runs(args, LogLevel::Quiet).is_err());
}

#[test]
fn test_diff_between_runs() {
    let dir = TempDir::new().unwrap();
    let first = write_run(&dir.path().join("first"), "d1", 0.1);
    let second = write_run(&dir.path().join("second"), "d2", 0.01);

    let args = DiffArgs {
        first: first.clone(),
        second,
    };
    diff::run_diff(args, LogLevel::Normal).unwrap();

    let same = DiffArgs {
        first: first.clone(),
        second: first,
    };
    diff::run_diff(same, LogLevel::Normal).unwrap();
}

#[test]
fn test_experiment_parser_from_flags() {
    let dir = TempDir::new().unwrap();
    let path = write_run(dir.path(), "flags", 0.1);

    let grouped = experiment_parser(Some("mode"), LogLevel::Verbose)
        .parse(&path)
        .unwrap();
    assert!(grouped.metrics.contains_key("train"));

    let plain = experiment_parser(None, LogLevel::Normal).parse(&path).unwrap();
    assert_eq!(plain.metrics.keys().collect::<Vec<_>>(), vec!["all"]);
    assert_eq!(plain.config().unwrap()["lr"], json!(0.1));
}

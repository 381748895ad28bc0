//! End-to-end properties of the write → parse → reconstruct pipeline.

use std::sync::{Arc, Mutex};

use logbook::backend::{RecordingClient, RemoteCall, RemoteClient, RemoteConfig, RemoteKind};
use logbook::parser::LogParser;
use logbook::record::{is_reserved, LOGBOOK_ID, LOGBOOK_TIMESTAMP, LOGBOOK_TYPE};
use logbook::{
    make_config, parse_experiment, Error, ErrorPolicy, Experiment, Fields, FilesystemConfig,
    KeyOptions, LogBook, LogBookConfig, MetricGrouping, MetricTable, RecordKind,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn filesystem_book(dir: &TempDir, id: &str) -> LogBook {
    LogBook::new(make_config(id, "props", Some(dir.path().to_path_buf()))).unwrap()
}

// ---------------------------------------------------------------------------
// Round-trip
// ---------------------------------------------------------------------------

#[test]
fn test_written_records_read_back_with_reserved_keys() {
    let dir = TempDir::new().unwrap();
    let mut book = filesystem_book(&dir, "rt-1");
    let metric = fields(json!({
        "mode": "train",
        "step": 4,
        "nested": {"a": [1, 2]},
        "note": null
    }));
    book.write_metric(&metric).unwrap();
    book.flush().unwrap();

    let records: Vec<_> = LogParser::default()
        .parse(dir.path().join("metric_log.jsonl"))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.kind(), &RecordKind::Metric);
    assert_eq!(record.get(LOGBOOK_ID), Some(&json!("rt-1")));
    assert!(record.get(LOGBOOK_TIMESTAMP).and_then(Value::as_str).is_some());
    assert_eq!(record.get(LOGBOOK_TYPE), Some(&json!("metric")));
    assert_eq!(record.without_reserved(), metric);
}

#[test]
fn test_round_trip_respects_retained_keys() {
    let dir = TempDir::new().unwrap();
    let keys = KeyOptions {
        key_map: Some([("epoch".to_string(), "step".to_string())].into_iter().collect()),
        key_prefix: Some("train/".to_string()),
    };
    let mut config = LogBookConfig::default();
    config.loggers.filesystem =
        Some(FilesystemConfig::new(dir.path()).single_file().with_keys(keys));
    let mut book = LogBook::new(config).unwrap();

    book.write_metric(&fields(json!({"epoch": 2, "loss": 0.3}))).unwrap();
    book.write_config(&fields(json!({"epoch": 9}))).unwrap();

    let records: Vec<_> = LogParser::default()
        .parse(dir.path().join("log.jsonl"))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(
        records[0].without_reserved(),
        fields(json!({"train/step": 2, "train/loss": 0.3}))
    );
    assert_eq!(records[1].without_reserved(), fields(json!({"train/epoch": 9})));
    assert_eq!(records[1].kind(), &RecordKind::Config);
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

#[test]
fn test_last_config_wins() {
    let dir = TempDir::new().unwrap();
    let mut book = filesystem_book(&dir, "cfg");
    book.write_config(&fields(json!({"lr": 0.1}))).unwrap();
    book.write_config(&fields(json!({"lr": 0.01}))).unwrap();

    let experiment = parse_experiment(dir.path()).unwrap();
    let configs: Vec<Fields> = experiment
        .configs
        .iter()
        .map(|c| {
            c.iter()
                .filter(|(k, _)| !is_reserved(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .collect();
    assert_eq!(configs, vec![fields(json!({"lr": 0.1})), fields(json!({"lr": 0.01}))]);
    assert_eq!(experiment.config().unwrap()["lr"], json!(0.01));
}

#[test]
fn test_null_fill_two_rows() {
    let rows = [fields(json!({"a": 1})), fields(json!({"b": 2}))];
    let table = MetricTable::from_records(&rows, ".");
    assert_eq!(table.num_rows(), 2);
    assert_eq!(table.columns(), ["a", "b"]);
    assert_eq!(table.row(0).unwrap(), fields(json!({"a": 1, "b": null})));
    assert_eq!(table.row(1).unwrap(), fields(json!({"a": null, "b": 2})));
}

#[test]
fn test_empty_experiment_deserializes_with_all_group() {
    let dir = TempDir::new().unwrap();
    let mut book = filesystem_book(&dir, "quiet-run");
    book.write_config(&fields(json!({"lr": 0.1}))).unwrap();
    book.write_message("no metrics here").unwrap();

    let experiment = parse_experiment(dir.path()).unwrap();
    let store = TempDir::new().unwrap();
    experiment.serialize_to(store.path()).unwrap();
    let restored = Experiment::deserialize_from(store.path()).unwrap();

    assert_eq!(restored.metrics.keys().collect::<Vec<_>>(), vec!["all"]);
    assert!(restored.metrics["all"].is_empty());
    assert_eq!(restored, experiment);
}

#[test]
fn test_grouped_experiment_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut book = filesystem_book(&dir, "grouped");
    for step in 0..5i32 {
        let mode = if step % 2 == 0 { "train" } else { "eval" };
        let loss = 1.0 / (f64::from(step) + 1.0);
        book.write_metric(&fields(json!({"mode": mode, "step": step, "loss": loss})))
            .unwrap();
    }

    let experiment = logbook::ExperimentParser::new()
        .group_by(MetricGrouping::by_key("mode"))
        .parse(dir.path())
        .unwrap();
    assert_eq!(experiment.metrics["train"].num_rows(), 3);
    assert_eq!(experiment.metrics["eval"].num_rows(), 2);

    let store = TempDir::new().unwrap();
    experiment.serialize_to(store.path()).unwrap();
    assert_eq!(Experiment::deserialize_from(store.path()).unwrap(), experiment);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn test_missing_step_fails_before_remote_call() {
    let client = RecordingClient::new();
    let handle = client.clone();
    let slot = Arc::new(Mutex::new(Some(client)));

    let mut config = LogBookConfig::default();
    config.loggers.mlflow = Some(RemoteConfig::default());
    let mut factory =
        move |_: RemoteKind, _: &Fields| -> logbook::Result<Box<dyn RemoteClient>> {
            let client = slot.lock().unwrap().take().unwrap();
            Ok(Box::new(client))
        };
    let mut book = LogBook::with_clients(config, &mut factory).unwrap();

    let err = book.write_metric(&fields(json!({"loss": 0.5}))).unwrap_err();
    assert!(matches!(err, Error::MissingRequiredKey { ref key, .. } if key == "step"));
    assert!(handle
        .calls()
        .iter()
        .all(|call| matches!(call, RemoteCall::Init { .. })));

    book.write_metric(&fields(json!({"loss": 0.5, "step": 1}))).unwrap();
    assert!(matches!(handle.calls().last(), Some(RemoteCall::LogMetrics { .. })));
}

#[test]
fn test_zero_file_glob_fails() {
    let err = LogParser::default().parse("/no/such/*.jsonl").err().unwrap();
    assert!(matches!(err, Error::NoMatchingFiles { .. }));
    assert!(err.is_user_error());

    let err = parse_experiment("/no/such/*.jsonl").unwrap_err();
    assert!(matches!(err, Error::NoMatchingFiles { .. }));
}

#[test]
fn test_truncated_final_line_is_dropped() {
    let dir = TempDir::new().unwrap();
    let mut book = filesystem_book(&dir, "crash");
    book.write_metric(&fields(json!({"step": 1}))).unwrap();
    book.flush().unwrap();
    drop(book);

    let path = dir.path().join("metric_log.jsonl");
    let mut content = std::fs::read_to_string(&path).unwrap();
    content.push_str("{\"step\": 2, \"logbook_type\": \"met");
    std::fs::write(&path, content).unwrap();

    let reports = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&reports);
    let policy = ErrorPolicy::custom(move |_, _| *counter.lock().unwrap() += 1);
    let experiment = logbook::ExperimentParser::new()
        .with_policy(policy)
        .parse(dir.path())
        .unwrap();

    assert_eq!(experiment.metrics["all"].num_rows(), 1);
    assert_eq!(*reports.lock().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_malformed_lines_never_reach_experiment(
        layout in proptest::collection::vec(any::<bool>(), 1..30),
    ) {
        let dir = TempDir::new().unwrap();
        let mut content = String::new();
        let mut valid = 0usize;
        for (i, ok) in layout.iter().enumerate() {
            if *ok {
                content.push_str(&format!("{{\"i\": {i}, \"logbook_type\": \"metric\"}}\n"));
                valid += 1;
            } else {
                content.push_str("}{ not json\n");
            }
        }
        std::fs::write(dir.path().join("metric_log.jsonl"), content).unwrap();

        let experiment = parse_experiment(dir.path()).unwrap();
        let table = &experiment.metrics["all"];
        prop_assert_eq!(table.num_rows(), valid);
        let order: Vec<u64> = table.numeric_column("i").iter().map(|v| *v as u64).collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(order, sorted);
    }
}

//! Tests for the parser module

use std::io::Write;
use std::sync::Mutex;

use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use super::*;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn collect(stream: RecordStream) -> Vec<Record> {
    stream.map(|r| r.unwrap()).collect()
}

/// Policy that counts reports into a shared log.
fn counting_policy() -> (ErrorPolicy, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let policy = ErrorPolicy::custom(move |line, _err| {
        sink.lock().unwrap().push(line.to_string());
    });
    (policy, seen)
}

// ---------------------------------------------------------------------------
// LineDecoder tests
// ---------------------------------------------------------------------------

#[test]
fn test_decode_valid_line() {
    let decoder = LineDecoder::default();
    assert_eq!(decoder.decode_line(r#"{"a": 1}"#), Some(json!({"a": 1})));
}

#[test]
fn test_decode_invalid_line_returns_none() {
    let decoder = LineDecoder::default();
    assert_eq!(decoder.decode_line("not json"), None);
    assert_eq!(decoder.decode_line(r#"{"a": 1"#), None);
}

#[test]
fn test_decode_blank_line_is_not_reported() {
    let (policy, seen) = counting_policy();
    let decoder = LineDecoder::new(policy);
    assert_eq!(decoder.decode_line("   "), None);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_custom_policy_receives_line() {
    let (policy, seen) = counting_policy();
    let decoder = LineDecoder::new(policy);
    assert_eq!(decoder.decode_line("{broken"), None);
    assert_eq!(*seen.lock().unwrap(), vec!["{broken".to_string()]);
}

#[test]
fn test_verbose_policy_still_skips() {
    let decoder = LineDecoder::new(ErrorPolicy::Verbose);
    assert_eq!(decoder.decode_line("garbage"), None);
}

#[test]
fn test_line_reports_once_across_matchers() {
    let (policy, seen) = counting_policy();
    let decoder = LineDecoder::new(policy);
    let line = Line::new("{oops", &decoder);
    assert!(Classifier::experiment().classify(&line).is_none());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Classifier tests
// ---------------------------------------------------------------------------

#[test]
fn test_classifier_routes_by_type() {
    let decoder = LineDecoder::default();
    let classifier = Classifier::experiment();

    let config = classifier
        .classify(&Line::new(r#"{"lr": 0.1, "logbook_type": "config"}"#, &decoder))
        .unwrap();
    assert_eq!(config.kind(), &RecordKind::Config);

    let metric = classifier
        .classify(&Line::new(r#"{"loss": 1, "logbook_type": "metric"}"#, &decoder))
        .unwrap();
    assert_eq!(metric.kind(), &RecordKind::Metric);

    let message = classifier
        .classify(&Line::new(r#"{"message": "hi", "logbook_type": "message"}"#, &decoder))
        .unwrap();
    assert_eq!(message.kind(), &RecordKind::Message);
}

#[test]
fn test_classifier_assigns_matching_type_when_untagged() {
    let decoder = LineDecoder::default();
    let record = Classifier::experiment()
        .classify(&Line::new(r#"{"free": "form"}"#, &decoder))
        .unwrap();
    assert_eq!(record.kind(), &RecordKind::Custom("info".into()));
    assert_eq!(record.get(LOGBOOK_TYPE), Some(&json!("info")));
}

#[test]
fn test_classifier_wraps_non_objects() {
    let decoder = LineDecoder::default();
    let record = Classifier::any_json(RecordKind::Message)
        .classify(&Line::new("[1, 2, 3]", &decoder))
        .unwrap();
    assert_eq!(record.get("data"), Some(&json!([1, 2, 3])));
    assert_eq!(record.kind(), &RecordKind::Message);
}

#[test]
fn test_classifier_drops_null_and_unmatched() {
    let decoder = LineDecoder::default();
    assert!(Classifier::any_json(RecordKind::Message)
        .classify(&Line::new("null", &decoder))
        .is_none());

    let metrics_only =
        Classifier::new().with(RecordKind::Metric, json_line_of_kind(RecordKind::Metric));
    assert!(metrics_only
        .classify(&Line::new(r#"{"logbook_type": "config"}"#, &decoder))
        .is_none());
}

#[test]
fn test_classifier_first_match_wins() {
    let decoder = LineDecoder::default();
    let classifier = Classifier::new()
        .with(RecordKind::Custom("first".into()), json_line())
        .with(RecordKind::Custom("second".into()), json_line());
    let record = classifier.classify(&Line::new(r#"{"x": 1}"#, &decoder)).unwrap();
    assert_eq!(record.kind(), &RecordKind::Custom("first".into()));
    assert_eq!(classifier.kinds().count(), 2);
}

// ---------------------------------------------------------------------------
// Path resolution tests
// ---------------------------------------------------------------------------

#[test]
fn test_resolve_directory_sorted_files_only() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "b.jsonl", "");
    write_file(dir.path(), "a.jsonl", "");
    std::fs::create_dir(dir.path().join("nested")).unwrap();

    let paths = resolve_paths(dir.path()).unwrap();
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
}

#[test]
fn test_resolve_glob() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "metric_log.jsonl", "");
    write_file(dir.path(), "notes.txt", "");

    let paths = resolve_paths(dir.path().join("*.jsonl")).unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].ends_with("metric_log.jsonl"));
}

#[test]
fn test_resolve_zero_files() {
    let err = resolve_paths("/no/such/*.jsonl").unwrap_err();
    assert!(matches!(err, Error::NoMatchingFiles { .. }));

    let empty = TempDir::new().unwrap();
    assert!(matches!(
        resolve_paths(empty.path()).unwrap_err(),
        Error::NoMatchingFiles { .. }
    ));
}

#[test]
fn test_resolve_invalid_pattern() {
    let err = resolve_paths("/tmp/***/x").unwrap_err();
    assert!(matches!(err, Error::InvalidPattern { .. }));
}

// ---------------------------------------------------------------------------
// LogParser tests
// ---------------------------------------------------------------------------

#[test]
fn test_parse_file_in_order_skipping_bad_lines() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "log.jsonl",
        "{\"i\": 1}\nnot json\n\n{\"i\": 2}\r\n{\"i\": 3",
    );

    let records = collect(LogParser::default().parse_file(&path).unwrap());
    let values: Vec<_> = records.iter().map(|r| r.get("i").cloned()).collect();
    assert_eq!(values, vec![Some(json!(1)), Some(json!(2))]);
    assert!(records.iter().all(|r| r.kind() == &RecordKind::Custom("log".into())));
}

#[test]
fn test_parse_file_missing() {
    let err = LogParser::default()
        .parse_file("/definitely/not/here.jsonl")
        .err()
        .unwrap();
    assert!(matches!(err, Error::NoMatchingFiles { .. }));
}

#[test]
fn test_parse_invalid_utf8_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bin.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"{\"ok\": 1}\n\xff\xfe\n{\"ok\": 2}\n").unwrap();
    drop(file);

    let (policy, seen) = counting_policy();
    let records = collect(LogParser::default().with_policy(policy).parse_file(&path).unwrap());
    assert_eq!(records.len(), 2);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_parse_concatenates_files_in_order() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "2.jsonl", "{\"f\": 2}\n");
    write_file(dir.path(), "1.jsonl", "{\"f\": 1}\n{\"f\": 1.5}\n");

    let stream = LogParser::default().parse(dir.path()).unwrap();
    assert_eq!(stream.remaining_files(), 2);
    let values: Vec<_> = collect(stream)
        .iter()
        .map(|r| r.get("f").cloned().unwrap())
        .collect();
    assert_eq!(values, vec![json!(1), json!(1.5), json!(2)]);
}

#[test]
fn test_metric_parser_filters_kind() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "log.jsonl",
        concat!(
            "{\"lr\": 0.1, \"logbook_type\": \"config\"}\n",
            "{\"loss\": 0.9, \"logbook_type\": \"metric\"}\n",
            "{\"loss\": 0.7, \"logbook_type\": \"metric\"}\n",
        ),
    );

    let metrics = collect(LogParser::metric().parse(dir.path()).unwrap());
    assert_eq!(metrics.len(), 2);
    let configs = collect(LogParser::config().parse(dir.path()).unwrap());
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].get("lr"), Some(&json!(0.1)));
}

#[test]
fn test_first_and_last_match() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "metric_log.jsonl",
        concat!(
            "{\"step\": 1, \"mode\": \"train\"}\n",
            "{\"step\": 2, \"mode\": \"eval\"}\n",
            "{\"step\": 3, \"mode\": \"train\"}\n",
        ),
    );
    let parser = LogParser::default();
    let is_train = |r: &Record| r.get("mode") == Some(&json!("train"));

    let first = parser.first_match(dir.path(), is_train).unwrap().unwrap();
    assert_eq!(first.get("step"), Some(&json!(1)));
    let last = parser.last_match(dir.path(), is_train).unwrap().unwrap();
    assert_eq!(last.get("step"), Some(&json!(3)));

    let none = parser
        .first_match(dir.path(), |r| r.contains_key("missing"))
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn test_parse_line() {
    let parser = LogParser::config();
    assert!(parser.parse_line(r#"{"logbook_type": "config", "a": 1}"#).is_some());
    assert!(parser.parse_line(r#"{"logbook_type": "metric"}"#).is_none());
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_malformed_lines_are_dropped_in_order(
        layout in proptest::collection::vec(any::<bool>(), 0..40),
    ) {
        let dir = TempDir::new().unwrap();
        let mut content = String::new();
        let mut expected = Vec::new();
        for (i, valid) in layout.iter().enumerate() {
            if *valid {
                content.push_str(&format!("{{\"n\": {i}}}\n"));
                expected.push(json!(i));
            } else {
                content.push_str(&format!("{{broken {i}\n"));
            }
        }
        let path = write_file(dir.path(), "mixed.jsonl", &content);

        let decoded: Vec<_> = collect(LogParser::default().parse_file(&path).unwrap())
            .into_iter()
            .map(|r| r.get("n").cloned().unwrap())
            .collect();
        prop_assert_eq!(decoded, expected);
    }
}

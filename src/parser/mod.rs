//! JSON-lines parsing
//!
//! Turns raw log lines back into classified [`Record`]s. Lines that fail to
//! decode are reported to an [`ErrorPolicy`] and dropped; they never stop a
//! stream.
//!
//! # Example
//!
//! ```no_run
//! use logbook::parser::LogParser;
//!
//! # fn main() -> logbook::Result<()> {
//! let parser = LogParser::metric();
//! for record in parser.parse("runs/3/*.jsonl")? {
//!     let record = record?;
//!     println!("{:?}", record.get("loss"));
//! }
//! # Ok(())
//! # }
//! ```

#[cfg(test)]
mod tests;

use std::cell::OnceCell;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::{Fields, Record, RecordKind, LOGBOOK_TYPE};

/// Callback receiving the offending line and its decode error.
pub type ErrorHandler = Arc<dyn Fn(&str, &dyn std::error::Error) + Send + Sync>;

/// What to do with a line that fails to decode.
///
/// Every policy drops the line; they only differ in who hears about it.
#[derive(Clone, Default)]
pub enum ErrorPolicy {
    /// Drop without a trace
    #[default]
    Silent,
    /// Emit a `tracing` warning, then drop
    Verbose,
    /// Hand the line and error to a callback, then drop
    Custom(ErrorHandler),
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => f.write_str("Silent"),
            Self::Verbose => f.write_str("Verbose"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl ErrorPolicy {
    pub fn custom<F>(handler: F) -> Self
    where
        F: Fn(&str, &dyn std::error::Error) + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(handler))
    }

    pub fn report(&self, line: &str, error: &dyn std::error::Error) {
        match self {
            Self::Silent => {}
            Self::Verbose => {
                tracing::warn!(line = %line, error = %error, "skipping malformed log line")
            }
            Self::Custom(handler) => handler(line, error),
        }
    }
}

/// Decodes single lines as JSON under an [`ErrorPolicy`].
#[derive(Debug, Clone, Default)]
pub struct LineDecoder {
    policy: ErrorPolicy,
}

impl LineDecoder {
    pub fn new(policy: ErrorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ErrorPolicy {
        &self.policy
    }

    /// Decode one line. Blank lines yield `None` without a report.
    pub fn decode_line(&self, line: &str) -> Option<Value> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => Some(value),
            Err(e) => {
                self.policy.report(line, &e);
                None
            }
        }
    }
}

/// A raw line with its JSON decoding computed at most once.
///
/// Matchers share one `Line`, so a malformed line is reported once no
/// matter how many matchers inspect it.
pub struct Line<'a> {
    raw: &'a str,
    decoder: &'a LineDecoder,
    json: OnceCell<Option<Value>>,
}

impl<'a> Line<'a> {
    pub fn new(raw: &'a str, decoder: &'a LineDecoder) -> Self {
        Self {
            raw,
            decoder,
            json: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| self.decoder.decode_line(self.raw))
            .as_ref()
    }
}

/// Extracts a value from a line, or `None` if the line does not match.
pub type LineMatcher = Arc<dyn Fn(&Line<'_>) -> Option<Value> + Send + Sync>;

/// Matches any line that decodes to non-null JSON.
pub fn json_line() -> LineMatcher {
    Arc::new(|line: &Line<'_>| line.json().filter(|v| !v.is_null()).cloned())
}

/// Matches JSON objects whose `logbook_type` equals `kind`.
pub fn json_line_of_kind(kind: RecordKind) -> LineMatcher {
    Arc::new(move |line: &Line<'_>| {
        let value = line.json()?;
        let tagged = value.get(LOGBOOK_TYPE).and_then(Value::as_str);
        (tagged == Some(kind.as_str())).then(|| value.clone())
    })
}

/// Ordered set of `(kind, matcher)` pairs; the first match wins.
#[derive(Clone, Default)]
pub struct Classifier {
    matchers: Vec<(RecordKind, LineMatcher)>,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&RecordKind> = self.matchers.iter().map(|(kind, _)| kind).collect();
        f.debug_struct("Classifier").field("kinds", &kinds).finish()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a matcher after the existing ones.
    #[must_use]
    pub fn with(mut self, kind: RecordKind, matcher: LineMatcher) -> Self {
        self.matchers.push((kind, matcher));
        self
    }

    /// Every JSON line, tagged `kind` unless it already carries a type.
    pub fn any_json(kind: RecordKind) -> Self {
        Self::new().with(kind, json_line())
    }

    /// Configs, then metrics, then any other JSON as `info`.
    pub fn experiment() -> Self {
        Self::new()
            .with(RecordKind::Config, json_line_of_kind(RecordKind::Config))
            .with(RecordKind::Metric, json_line_of_kind(RecordKind::Metric))
            .with(RecordKind::Custom("info".to_string()), json_line())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &RecordKind> {
        self.matchers.iter().map(|(kind, _)| kind)
    }

    /// Classify one line. Non-object values are wrapped as `{"data": value}`.
    pub fn classify(&self, line: &Line<'_>) -> Option<Record> {
        self.matchers.iter().find_map(|(kind, matcher)| {
            let fields = match matcher(line)? {
                Value::Object(map) => map,
                other => {
                    let mut wrapped = Fields::new();
                    wrapped.insert("data".to_string(), other);
                    wrapped
                }
            };
            Some(Record::tagged(fields, kind.clone()))
        })
    }
}

/// Resolve a directory or glob pattern to the files it names.
///
/// A directory yields its regular files (non-recursive) sorted by name.
/// Anything else is treated as a glob pattern; a plain file path is a
/// pattern matching itself.
pub fn resolve_paths(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let pattern = path.to_string_lossy().into_owned();

    let files = if path.is_dir() {
        let entries = std::fs::read_dir(path)
            .map_err(|e| Error::io(format!("listing {}", path.display()), e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(format!("listing {}", path.display()), e))?;
            let entry_path = entry.path();
            if entry_path.is_file() {
                files.push(entry_path);
            }
        }
        files.sort();
        files
    } else {
        glob::glob(&pattern)
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect()
    };

    if files.is_empty() {
        return Err(Error::NoMatchingFiles { pattern });
    }
    Ok(files)
}

/// Parses log files into classified records.
#[derive(Debug, Clone)]
pub struct LogParser {
    decoder: LineDecoder,
    classifier: Arc<Classifier>,
}

impl Default for LogParser {
    /// Every JSON line, untyped lines tagged `log`.
    fn default() -> Self {
        Self::new(Classifier::any_json(RecordKind::Custom("log".to_string())))
    }
}

impl LogParser {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            decoder: LineDecoder::default(),
            classifier: Arc::new(classifier),
        }
    }

    /// Config records only.
    pub fn config() -> Self {
        Self::new(
            Classifier::new().with(RecordKind::Config, json_line_of_kind(RecordKind::Config)),
        )
    }

    /// Metric records only.
    pub fn metric() -> Self {
        Self::new(
            Classifier::new().with(RecordKind::Metric, json_line_of_kind(RecordKind::Metric)),
        )
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.decoder = LineDecoder::new(policy);
        self
    }

    pub fn decoder(&self) -> &LineDecoder {
        &self.decoder
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Decode and classify one line.
    pub fn parse_line(&self, line: &str) -> Option<Record> {
        self.classifier.classify(&Line::new(line, &self.decoder))
    }

    /// Stream the records of one file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<RecordStream> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::NoMatchingFiles {
                pattern: path.display().to_string(),
            });
        }
        Ok(self.stream(vec![path.to_path_buf()]))
    }

    /// Stream the records of every file a directory or glob resolves to.
    ///
    /// Resolution happens eagerly, so a pattern matching nothing fails here
    /// rather than on first iteration.
    pub fn parse(&self, pattern: impl AsRef<Path>) -> Result<RecordStream> {
        let paths = resolve_paths(pattern)?;
        Ok(self.stream(paths))
    }

    /// First record satisfying `predicate`, reading no further than needed.
    pub fn first_match<P>(
        &self,
        pattern: impl AsRef<Path>,
        mut predicate: P,
    ) -> Result<Option<Record>>
    where
        P: FnMut(&Record) -> bool,
    {
        for record in self.parse(pattern)? {
            let record = record?;
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Last record satisfying `predicate`.
    pub fn last_match<P>(
        &self,
        pattern: impl AsRef<Path>,
        mut predicate: P,
    ) -> Result<Option<Record>>
    where
        P: FnMut(&Record) -> bool,
    {
        let mut last = None;
        for record in self.parse(pattern)? {
            let record = record?;
            if predicate(&record) {
                last = Some(record);
            }
        }
        Ok(last)
    }

    fn stream(&self, paths: Vec<PathBuf>) -> RecordStream {
        RecordStream {
            pending: paths.into(),
            current: None,
            decoder: self.decoder.clone(),
            classifier: Arc::clone(&self.classifier),
            buf: Vec::new(),
        }
    }
}

struct OpenFile {
    path: PathBuf,
    reader: BufReader<File>,
}

/// Lazy, forward-only stream of records across one or more files.
///
/// Files are opened one at a time and closed as soon as they are exhausted.
/// IO failures surface as `Err` items; malformed lines do not.
pub struct RecordStream {
    pending: VecDeque<PathBuf>,
    current: Option<OpenFile>,
    decoder: LineDecoder,
    classifier: Arc<Classifier>,
    buf: Vec<u8>,
}

impl RecordStream {
    /// Files not yet opened.
    pub fn remaining_files(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let path = self.pending.pop_front()?;
                let file = match File::open(&path) {
                    Ok(file) => file,
                    Err(e) => return Some(Err(Error::io(format!("opening {}", path.display()), e))),
                };
                tracing::debug!(path = %path.display(), "reading log file");
                self.current = Some(OpenFile {
                    path,
                    reader: BufReader::new(file),
                });
            }
            let Some(open) = self.current.as_mut() else {
                continue;
            };

            self.buf.clear();
            match open.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.current = None;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    let context = format!("reading {}", open.path.display());
                    self.current = None;
                    return Some(Err(Error::io(context, e)));
                }
            }

            let text = match std::str::from_utf8(&self.buf) {
                Ok(text) => text,
                Err(e) => {
                    self.decoder
                        .policy()
                        .report(&String::from_utf8_lossy(&self.buf), &e);
                    continue;
                }
            };
            let line = Line::new(text.trim_end_matches(['\n', '\r']), &self.decoder);
            if let Some(record) = self.classifier.classify(&line) {
                return Some(Ok(record));
            }
        }
    }
}

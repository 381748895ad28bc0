//! Record model and stamping.
//!
//! A record is an ordered JSON object. The dispatcher stamps every record
//! with three reserved keys before any backend sees it:
//!
//! - `logbook_id`: identifier of the producing [`LogBook`](crate::LogBook)
//! - `logbook_timestamp`: human-readable wall-clock time of the write
//! - `logbook_type`: the [`RecordKind`], the only discriminator used downstream

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Ordered key/value payload of a record.
pub type Fields = Map<String, Value>;

/// Reserved key holding the producing logbook id.
pub const LOGBOOK_ID: &str = "logbook_id";
/// Reserved key holding the write timestamp.
pub const LOGBOOK_TIMESTAMP: &str = "logbook_timestamp";
/// Reserved key holding the record kind.
pub const LOGBOOK_TYPE: &str = "logbook_type";

/// All reserved keys, in stamping order.
pub const RESERVED_KEYS: [&str; 3] = [LOGBOOK_ID, LOGBOOK_TIMESTAMP, LOGBOOK_TYPE];

/// Default separator used when flattening nested metric keys.
pub const DEFAULT_SEPARATOR: &str = ".";

const TIMESTAMP_FORMAT: &str = "%I:%M%p %Z %b %d, %Y";

/// Kind of a record.
///
/// The four standard kinds get dedicated files in the filesystem backend.
/// Any other name is carried as [`RecordKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    /// Experiment hyperparameters
    Config,
    /// Time-series measurements
    Metric,
    /// Free-form run metadata
    Metadata,
    /// A single payload wrapped under `message`
    Message,
    /// Any other kind, by name
    Custom(String),
}

impl RecordKind {
    /// The four kinds with a dedicated file route.
    pub const STANDARD: [RecordKind; 4] = [
        RecordKind::Config,
        RecordKind::Message,
        RecordKind::Metadata,
        RecordKind::Metric,
    ];

    /// Name written into `logbook_type`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Config => "config",
            Self::Metric => "metric",
            Self::Metadata => "metadata",
            Self::Message => "message",
            Self::Custom(name) => name,
        }
    }

    /// True for config, metric, metadata and message.
    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl From<&str> for RecordKind {
    fn from(name: &str) -> Self {
        match name {
            "config" => Self::Config,
            "metric" => Self::Metric,
            "metadata" => Self::Metadata,
            "message" => Self::Message,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl FromStr for RecordKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RecordKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecordKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| Self::from(s.as_str()))
    }
}

/// A single logged event.
///
/// Serializes as its fields alone, so the wire form is exactly one JSON
/// object per record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: RecordKind,
    fields: Fields,
}

impl Record {
    /// Wrap fields under an explicit kind. Fields are left untouched.
    pub fn new(kind: RecordKind, fields: Fields) -> Self {
        Self { kind, fields }
    }

    /// Build a record whose kind comes from its `logbook_type` field.
    ///
    /// When the field is absent the record is tagged with `fallback`, which
    /// is also written into `logbook_type`. A non-string `logbook_type` is
    /// left as is and only the kind falls back.
    pub fn tagged(mut fields: Fields, fallback: RecordKind) -> Self {
        let kind = match fields.get(LOGBOOK_TYPE) {
            Some(Value::String(name)) => RecordKind::from(name.as_str()),
            Some(_) => fallback,
            None => {
                fields.insert(
                    LOGBOOK_TYPE.to_string(),
                    Value::String(fallback.as_str().to_string()),
                );
                fallback
            }
        };
        Self { kind, fields }
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Id of the logbook that wrote this record, if stamped.
    pub fn run_id(&self) -> Option<&str> {
        self.fields.get(LOGBOOK_ID).and_then(Value::as_str)
    }

    /// Write timestamp, if stamped.
    pub fn timestamp(&self) -> Option<&str> {
        self.fields.get(LOGBOOK_TIMESTAMP).and_then(Value::as_str)
    }

    /// Copy of the fields with the reserved keys removed.
    pub fn without_reserved(&self) -> Fields {
        self.fields
            .iter()
            .filter(|(key, _)| !is_reserved(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Whether `key` is one of the three reserved stamping keys.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Current local time in the logbook timestamp format.
pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Stamp a copy of `fields` with the reserved keys.
///
/// The caller's map is never modified. Existing reserved keys are overwritten.
pub fn stamp(fields: &Fields, run_id: &str, kind: RecordKind) -> Record {
    stamp_at(fields, run_id, kind, &timestamp_now())
}

/// Like [`stamp`] with an explicit timestamp.
pub fn stamp_at(fields: &Fields, run_id: &str, kind: RecordKind, timestamp: &str) -> Record {
    let mut stamped = fields.clone();
    stamped.insert(LOGBOOK_ID.to_string(), Value::String(run_id.to_string()));
    stamped.insert(
        LOGBOOK_TIMESTAMP.to_string(),
        Value::String(timestamp.to_string()),
    );
    stamped.insert(
        LOGBOOK_TYPE.to_string(),
        Value::String(kind.as_str().to_string()),
    );
    Record::new(kind, stamped)
}

/// Flatten nested objects into `parent{sep}child` keys.
///
/// Lists are leaves. Nested empty objects contribute no keys.
pub fn flatten(fields: &Fields, sep: &str) -> Fields {
    let mut out = Fields::new();
    flatten_into(&mut out, None, fields, sep);
    out
}

fn flatten_into(out: &mut Fields, parent: Option<&str>, fields: &Fields, sep: &str) {
    for (key, value) in fields {
        let path = match parent {
            Some(parent) => format!("{parent}{sep}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&path), inner, sep),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}

/// Keys that differ between two records, computed over flattened keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDiff {
    /// Present in both with different values
    pub different: Vec<String>,
    /// Present only in the second record
    pub missing_in_first: Vec<String>,
    /// Present only in the first record
    pub missing_in_second: Vec<String>,
}

impl RecordDiff {
    pub fn is_empty(&self) -> bool {
        self.different.is_empty()
            && self.missing_in_first.is_empty()
            && self.missing_in_second.is_empty()
    }
}

/// Compare two records key by key. Output lists are sorted.
pub fn compare_records(first: &Fields, second: &Fields, sep: &str) -> RecordDiff {
    let first = flatten(first, sep);
    let second = flatten(second, sep);
    let keys: BTreeSet<&String> = first.keys().chain(second.keys()).collect();

    let mut diff = RecordDiff::default();
    for key in keys {
        match (first.get(key), second.get(key)) {
            (None, Some(_)) => diff.missing_in_first.push(key.clone()),
            (Some(_), None) => diff.missing_in_second.push(key.clone()),
            (Some(a), Some(b)) if a != b => diff.different.push(key.clone()),
            _ => {}
        }
    }
    diff
}

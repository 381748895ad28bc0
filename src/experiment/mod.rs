//! Experiment reconstruction
//!
//! Rebuilds one run from its persisted records: configs in write order,
//! metric records grouped into [`MetricTable`]s, and every other record
//! kind collected under `info`.

mod sequence;
mod store;
mod table;


use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::parser::{Classifier, ErrorPolicy, LogParser};
use crate::record::{Fields, RecordKind, DEFAULT_SEPARATOR};

pub use sequence::{
    concat_metrics, first_non_empty_configs, first_non_empty_info, ExperimentSequence,
};
pub use table::MetricTable;

/// Group every metric record falls into unless grouped otherwise.
pub const DEFAULT_GROUP: &str = "all";

/// Metric tables keyed by group.
pub type MetricGroups = BTreeMap<String, MetricTable>;

/// Raw records keyed by record kind name.
pub type InfoMap = BTreeMap<String, Vec<Fields>>;

/// One reconstructed run.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    /// Config records in write order; the last one is effective
    pub configs: Vec<Fields>,
    /// Never empty: at least the `"all"` group
    pub metrics: MetricGroups,
    /// Records of every kind other than config and metric
    pub info: InfoMap,
}

impl Default for Experiment {
    fn default() -> Self {
        Self::new(Vec::new(), MetricGroups::new(), InfoMap::new())
    }
}

impl Experiment {
    /// An empty `metrics` map is replaced by a single empty `"all"` group.
    pub fn new(configs: Vec<Fields>, mut metrics: MetricGroups, info: InfoMap) -> Self {
        if metrics.is_empty() {
            metrics.insert(DEFAULT_GROUP.to_string(), MetricTable::new());
        }
        Self {
            configs,
            metrics,
            info,
        }
    }

    /// Effective config: the last one written.
    pub fn config(&self) -> Option<&Fields> {
        self.configs.last()
    }

    pub fn metric_group(&self, group: &str) -> Option<&MetricTable> {
        self.metrics.get(group)
    }

    /// Total metric rows across groups.
    pub fn num_metric_rows(&self) -> usize {
        self.metrics.values().map(MetricTable::num_rows).sum()
    }

    /// Records logged under `kind`, e.g. `"message"`.
    pub fn info_records(&self, kind: &str) -> &[Fields] {
        self.info.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Caller-supplied group function.
pub type GroupFn = Arc<dyn Fn(&Fields) -> String + Send + Sync>;

/// Per-group table transform applied after grouping.
pub type AggregateFn = Arc<dyn Fn(&str, MetricTable) -> MetricTable + Send + Sync>;

/// How metric records are partitioned into groups.
#[derive(Clone, Default)]
pub enum MetricGrouping {
    /// One `"all"` group
    #[default]
    All,
    /// By the value of a key; records without it go to `"all"`
    ByKey(String),
    Custom(GroupFn),
}

impl fmt::Debug for MetricGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::ByKey(key) => f.debug_tuple("ByKey").field(key).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl MetricGrouping {
    pub fn by_key(key: impl Into<String>) -> Self {
        Self::ByKey(key.into())
    }

    pub fn custom<F>(group: F) -> Self
    where
        F: Fn(&Fields) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(group))
    }

    /// Group name for one metric record.
    pub fn group_of(&self, record: &Fields) -> String {
        match self {
            Self::All => DEFAULT_GROUP.to_string(),
            Self::ByKey(key) => match record.get(key) {
                None | Some(Value::Null) => DEFAULT_GROUP.to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            },
            Self::Custom(group) => group(record),
        }
    }
}

/// Group metric records and build one table per group.
///
/// Row order within a group follows input order. With no records the
/// result is a single empty `"all"` group.
pub fn metrics_to_tables(
    records: &[Fields],
    grouping: &MetricGrouping,
    sep: &str,
) -> MetricGroups {
    let mut grouped: BTreeMap<String, Vec<&Fields>> = BTreeMap::new();
    for record in records {
        grouped.entry(grouping.group_of(record)).or_default().push(record);
    }

    let mut tables: MetricGroups = grouped
        .into_iter()
        .map(|(group, rows)| (group, MetricTable::from_records(rows, sep)))
        .collect();
    if tables.is_empty() {
        tables.insert(DEFAULT_GROUP.to_string(), MetricTable::new());
    }
    tables
}

/// Builds [`Experiment`]s from log files.
#[derive(Clone)]
pub struct ExperimentParser {
    policy: ErrorPolicy,
    grouping: MetricGrouping,
    aggregate: Option<AggregateFn>,
    separator: String,
}

impl Default for ExperimentParser {
    fn default() -> Self {
        Self {
            policy: ErrorPolicy::default(),
            grouping: MetricGrouping::default(),
            aggregate: None,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl fmt::Debug for ExperimentParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentParser")
            .field("policy", &self.policy)
            .field("grouping", &self.grouping)
            .field("aggregate", &self.aggregate.is_some())
            .field("separator", &self.separator)
            .finish()
    }
}

impl ExperimentParser {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn group_by(mut self, grouping: MetricGrouping) -> Self {
        self.grouping = grouping;
        self
    }

    /// Transform each group's table after it is built.
    #[must_use]
    pub fn with_aggregate<F>(mut self, aggregate: F) -> Self
    where
        F: Fn(&str, MetricTable) -> MetricTable + Send + Sync + 'static,
    {
        self.aggregate = Some(Arc::new(aggregate));
        self
    }

    /// Separator for flattened metric columns (default `.`).
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Parse every file a directory or glob resolves to as one run.
    pub fn parse(&self, pattern: impl AsRef<Path>) -> Result<Experiment> {
        let parser = LogParser::new(Classifier::experiment()).with_policy(self.policy.clone());

        let mut configs = Vec::new();
        let mut metrics = Vec::new();
        let mut info = InfoMap::new();
        for record in parser.parse(pattern)? {
            let record = record?;
            match record.kind().clone() {
                RecordKind::Config => configs.push(record.into_fields()),
                RecordKind::Metric => metrics.push(record.into_fields()),
                other => info
                    .entry(other.as_str().to_string())
                    .or_default()
                    .push(record.into_fields()),
            }
        }

        let mut tables = metrics_to_tables(&metrics, &self.grouping, &self.separator);
        if let Some(aggregate) = &self.aggregate {
            tables = tables
                .into_iter()
                .map(|(group, table)| {
                    let table = aggregate(&group, table);
                    (group, table)
                })
                .collect();
        }
        Ok(Experiment::new(configs, tables, info))
    }

    /// Parse every immediate sub-directory of `root` as one run, in name
    /// order. Sub-directories without files are skipped.
    pub fn parse_sequence(&self, root: impl AsRef<Path>) -> Result<ExperimentSequence> {
        let root = root.as_ref();
        let entries = std::fs::read_dir(root)
            .map_err(|e| Error::io(format!("listing {}", root.display()), e))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::io(format!("listing {}", root.display()), e))?
                .path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();

        let mut experiments = Vec::with_capacity(dirs.len());
        for dir in dirs {
            match self.parse(&dir) {
                Ok(experiment) => experiments.push(experiment),
                Err(Error::NoMatchingFiles { .. }) => {
                    tracing::debug!(dir = %dir.display(), "skipping directory without log files");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ExperimentSequence::new(experiments))
    }
}

/// Parse one run with default settings.
pub fn parse_experiment(pattern: impl AsRef<Path>) -> Result<Experiment> {
    ExperimentParser::default().parse(pattern)
}

/// Parse every run under `root` with default settings.
pub fn parse_experiment_sequence(root: impl AsRef<Path>) -> Result<ExperimentSequence> {
    ExperimentParser::default().parse_sequence(root)
}

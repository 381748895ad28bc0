//! Structured experiment logging.
//!
//! This crate provides:
//! - A [`LogBook`] that stamps records and fans them out to backends
//! - An append-only JSON-lines filesystem backend plus adapters for remote
//!   tracking services
//! - A corruption-tolerant parser that reads the logs back
//! - [`Experiment`] reconstruction: configs, metric tables and info records
//!   for one run, and sequences of runs
//!
//! # Example
//!
//! ```
//! use logbook::{make_config, parse_experiment, LogBook};
//! use serde_json::json;
//!
//! # fn main() -> logbook::Result<()> {
//! let dir = tempfile::tempdir().map_err(|e| logbook::Error::io("tempdir", e))?;
//! let mut book = LogBook::new(make_config("run-1", "demo", Some(dir.path().to_path_buf())))?;
//!
//! let metric = json!({"mode": "train", "loss": 0.25, "step": 10});
//! book.write_metric(metric.as_object().unwrap())?;
//!
//! let experiment = parse_experiment(dir.path())?;
//! assert_eq!(experiment.metrics["all"].num_rows(), 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cli;
pub mod dispatch;
pub mod error;
pub mod experiment;
pub mod parser;
pub mod record;

pub use backend::{Backend, FilesystemBackend, FilesystemConfig, KeyFilter, KeyOptions};
pub use dispatch::{make_config, BackendConfigs, ClientFactory, LogBook, LogBookConfig};
pub use error::{Error, Result};
pub use experiment::{
    parse_experiment, parse_experiment_sequence, Experiment, ExperimentParser,
    ExperimentSequence, MetricGrouping, MetricTable,
};
pub use parser::{ErrorPolicy, LogParser};
pub use record::{compare_records, flatten, stamp, Fields, Record, RecordKind};

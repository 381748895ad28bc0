//! On-disk experiment layout
//!
//! ```text
//! <dir>/
//!   config.jsonl        one config object per line
//!   metric/<group>.json one columnar table per metric group
//!   info.gzip           gzip-compressed JSON of the info map
//! ```

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Experiment, InfoMap, MetricGroups, MetricTable};
use crate::error::{Error, Result};
use crate::record::Fields;

const CONFIG_FILE: &str = "config.jsonl";
const METRIC_DIR: &str = "metric";
const INFO_FILE: &str = "info.gzip";
const TABLE_EXTENSION: &str = "json";

/// Serializable snapshot of one metric table.
#[derive(Debug, Serialize, Deserialize)]
struct StoredTable {
    group: String,
    columns: Vec<String>,
    num_rows: usize,
    data: Vec<Vec<Value>>,
}

impl StoredTable {
    fn new(group: &str, table: &MetricTable) -> Self {
        Self {
            group: group.to_string(),
            columns: table.columns().to_vec(),
            num_rows: table.num_rows(),
            data: table.data().to_vec(),
        }
    }

    fn into_table(self, path: &Path) -> Result<(String, MetricTable)> {
        let mut table = MetricTable::from_columns(self.columns, self.data)?;
        if table.num_columns() == 0 {
            // rows without any column carry no data, only their count
            for _ in 0..self.num_rows {
                table.push_row(&Fields::new());
            }
        }
        if table.num_rows() != self.num_rows {
            return Err(invalid(
                path,
                format!("declares {} rows, holds {}", self.num_rows, table.num_rows()),
            ));
        }
        Ok((self.group, table))
    }
}

fn invalid(path: &Path, message: impl Into<String>) -> Error {
    Error::InvalidExperiment {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// File stem for a group: anything outside `[A-Za-z0-9._-]` becomes `_`.
fn group_file_stem(group: &str) -> String {
    let stem: String = group
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.starts_with('.') {
        format!("_{stem}")
    } else {
        stem
    }
}

impl Experiment {
    /// Write this experiment under `dir`, replacing any previous contents
    /// of the three store entries.
    pub fn serialize_to(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| Error::io(format!("creating {}", dir.display()), e))?;

        write_configs(&dir.join(CONFIG_FILE), &self.configs)?;
        write_metrics(&dir.join(METRIC_DIR), &self.metrics)?;
        write_info(&dir.join(INFO_FILE), &self.info)?;

        tracing::debug!(dir = %dir.display(), groups = self.metrics.len(), "experiment serialized");
        Ok(())
    }

    /// Read an experiment written by [`Experiment::serialize_to`].
    ///
    /// `config.jsonl` and `info.gzip` must exist. A missing or empty
    /// `metric/` directory yields a single empty `"all"` group.
    pub fn deserialize_from(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(invalid(dir, "not a directory"));
        }
        let configs = read_configs(&dir.join(CONFIG_FILE))?;
        let metrics = read_metrics(&dir.join(METRIC_DIR))?;
        let info = read_info(&dir.join(INFO_FILE))?;
        Ok(Self::new(configs, metrics, info))
    }
}

fn write_configs(path: &Path, configs: &[Fields]) -> Result<()> {
    let file =
        File::create(path).map_err(|e| Error::io(format!("creating {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    for config in configs {
        serde_json::to_writer(&mut writer, config)?;
        writer
            .write_all(b"\n")
            .map_err(|e| Error::io(format!("writing {}", path.display()), e))?;
    }
    writer
        .flush()
        .map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

fn read_configs(path: &Path) -> Result<Vec<Fields>> {
    if !path.is_file() {
        return Err(invalid(path, "missing config.jsonl"));
    }
    let content =
        fs::read_to_string(path).map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
    let mut configs = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line)? {
            Value::Object(config) => configs.push(config),
            _ => return Err(invalid(path, format!("line {} is not a JSON object", i + 1))),
        }
    }
    Ok(configs)
}

fn write_metrics(dir: &Path, metrics: &MetricGroups) -> Result<()> {
    if dir.is_dir() {
        for path in table_files(dir)? {
            fs::remove_file(&path)
                .map_err(|e| Error::io(format!("removing {}", path.display()), e))?;
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| Error::io(format!("creating {}", dir.display()), e))?;
    }

    let mut used = BTreeSet::new();
    for (group, table) in metrics {
        let base = group_file_stem(group);
        let mut stem = base.clone();
        let mut n = 1;
        while !used.insert(stem.clone()) {
            stem = format!("{base}_{n}");
            n += 1;
        }

        let path = dir.join(format!("{stem}.{TABLE_EXTENSION}"));
        let json = serde_json::to_string(&StoredTable::new(group, table))?;
        fs::write(&path, json).map_err(|e| Error::io(format!("writing {}", path.display()), e))?;
    }
    Ok(())
}

fn read_metrics(dir: &Path) -> Result<MetricGroups> {
    let mut metrics = MetricGroups::new();
    if !dir.is_dir() {
        return Ok(metrics);
    }
    for path in table_files(dir)? {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        let stored: StoredTable = serde_json::from_str(&content)?;
        let (group, table) = stored.into_table(&path)?;
        if metrics.insert(group.clone(), table).is_some() {
            return Err(invalid(&path, format!("duplicate metric group '{group}'")));
        }
    }
    Ok(metrics)
}

/// Table files in `dir`, sorted by name.
fn table_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).map_err(|e| Error::io(format!("listing {}", dir.display()), e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| Error::io(format!("listing {}", dir.display()), e))?
            .path();
        let is_table = path.extension().and_then(|e| e.to_str()) == Some(TABLE_EXTENSION);
        if path.is_file() && is_table {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn write_info(path: &Path, info: &InfoMap) -> Result<()> {
    let file =
        File::create(path).map_err(|e| Error::io(format!("creating {}", path.display()), e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, info)?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .map_err(|e| Error::io(format!("writing {}", path.display()), e))
}

fn read_info(path: &Path) -> Result<InfoMap> {
    if !path.is_file() {
        return Err(invalid(path, "missing info.gzip"));
    }
    let file = File::open(path).map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    Ok(serde_json::from_reader(decoder)?)
}

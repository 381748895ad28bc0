//! Filesystem backend: append-only JSON lines.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Backend, KeyFilter, KeyOptions};
use crate::error::{Error, Result};
use crate::record::{Record, RecordKind};

const BACKEND_NAME: &str = "filesystem";

fn default_true() -> bool {
    true
}

/// Filesystem backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Directory the log files are written to, created if absent
    pub log_dir: PathBuf,
    /// Explicit file name; forces single-file mode and ignores the prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Prepended to generated file names
    #[serde(default)]
    pub filename_prefix: String,
    /// One file per record kind (`true`) or a single `log.jsonl`
    #[serde(default = "default_true")]
    pub create_multiple_log_files: bool,
    /// Also print every line to stdout
    #[serde(default)]
    pub echo: bool,
    #[serde(flatten)]
    pub keys: KeyOptions,
}

impl FilesystemConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            filename: None,
            filename_prefix: String::new(),
            create_multiple_log_files: true,
            echo: false,
            keys: KeyOptions::default(),
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filename_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn single_file(mut self) -> Self {
        self.create_multiple_log_files = false;
        self
    }

    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    #[must_use]
    pub fn with_keys(mut self, keys: KeyOptions) -> Self {
        self.keys = keys;
        self
    }

    fn is_single_file(&self) -> bool {
        self.filename.is_some() || !self.create_multiple_log_files
    }

    /// Path a record of `kind` is written to.
    ///
    /// Non-standard kinds share the message file in multi-file mode.
    pub fn file_path(&self, kind: &RecordKind) -> PathBuf {
        if self.is_single_file() {
            return self.log_dir.join(log_file_name(
                self.filename.as_deref(),
                &self.filename_prefix,
                "log",
            ));
        }
        let routed = if kind.is_standard() {
            kind
        } else {
            &RecordKind::Message
        };
        let suffix = format!("{}_log", routed.as_str());
        self.log_dir
            .join(log_file_name(None, &self.filename_prefix, &suffix))
    }
}

/// File name for a log file: the explicit name if given, else
/// `{prefix}{suffix}.jsonl`.
pub fn log_file_name(filename: Option<&str>, prefix: &str, suffix: &str) -> String {
    match filename {
        Some(name) => name.to_string(),
        None => format!("{prefix}{suffix}.jsonl"),
    }
}

#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    file: File,
}

impl LogFile {
    fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
        Ok(Self { path, file })
    }

    /// One `write_all` per line so concurrent appenders interleave whole lines.
    fn append_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.file.write_all(buf.as_bytes())
    }
}

#[derive(Debug)]
enum Route {
    Single(LogFile),
    PerKind(BTreeMap<RecordKind, LogFile>),
}

/// Append-only JSON-lines backend.
///
/// Files are opened at construction and closed on drop.
#[derive(Debug)]
pub struct FilesystemBackend {
    config: FilesystemConfig,
    filter: KeyFilter,
    route: Route,
}

impl FilesystemBackend {
    /// Create the log directory and open the output file(s).
    pub fn new(config: FilesystemConfig) -> Result<Self> {
        if !config.log_dir.exists() {
            fs::create_dir_all(&config.log_dir).map_err(|e| {
                Error::io(format!("creating {}", config.log_dir.display()), e)
            })?;
        }

        let route = if config.is_single_file() {
            Route::Single(LogFile::open(config.file_path(&RecordKind::Message))?)
        } else {
            let mut files = BTreeMap::new();
            for kind in RecordKind::STANDARD {
                let file = LogFile::open(config.file_path(&kind))?;
                files.insert(kind, file);
            }
            Route::PerKind(files)
        };

        let filter = KeyFilter::new(config.keys.clone());
        Ok(Self {
            config,
            filter,
            route,
        })
    }

    pub fn config(&self) -> &FilesystemConfig {
        &self.config
    }

    pub fn log_dir(&self) -> &Path {
        &self.config.log_dir
    }

    /// Paths of all open log files.
    pub fn paths(&self) -> Vec<&Path> {
        match &self.route {
            Route::Single(file) => vec![file.path.as_path()],
            Route::PerKind(files) => files.values().map(|f| f.path.as_path()).collect(),
        }
    }

    fn target(&mut self, kind: &RecordKind) -> Option<&mut LogFile> {
        match &mut self.route {
            Route::Single(file) => Some(file),
            Route::PerKind(files) => {
                if kind.is_standard() {
                    files.get_mut(kind)
                } else {
                    files.get_mut(&RecordKind::Message)
                }
            }
        }
    }
}

impl Backend for FilesystemBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        let fields = if record.kind() == &RecordKind::Metric {
            self.filter.prepare_metric(record.fields())
        } else {
            self.filter.prepare(record.fields())
        };
        let line = serde_json::to_string(&fields)?;

        let echo = self.config.echo;
        let file = self.target(record.kind()).ok_or_else(|| {
            Error::backend(BACKEND_NAME, format!("no route for '{}' records", record.kind()))
        })?;
        file.append_line(&line).map_err(|e| {
            Error::backend(BACKEND_NAME, format!("{}: {e}", file.path.display()))
        })?;

        if echo {
            writeln!(io::stdout().lock(), "{line}")
                .map_err(|e| Error::backend(BACKEND_NAME, format!("echo to stdout: {e}")))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let files: Vec<&mut LogFile> = match &mut self.route {
            Route::Single(file) => vec![file],
            Route::PerKind(files) => files.values_mut().collect(),
        };
        for file in files {
            file.file.flush().map_err(|e| {
                Error::backend(BACKEND_NAME, format!("{}: {e}", file.path.display()))
            })?;
        }
        Ok(())
    }
}

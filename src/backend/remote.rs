//! Remote tracking-service adapters
//!
//! Wire protocols are owned by a [`RemoteClient`]; the adapters here only
//! translate stamped records into [`RemoteCall`]s shaped the way each
//! service expects them.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{take_key, Backend, KeyFilter, KeyOptions};
use crate::error::{Error, Result};
use crate::record::{flatten, Fields, Record, RecordKind};

/// Key that step-indexed services require on every metric record.
pub const STEP_KEY: &str = "step";

/// Separator for tensorboard scalar tags built from nested metrics.
const TAG_SEPARATOR: &str = "/";

/// Supported remote services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    Wandb,
    Mlflow,
    Tensorboard,
    Mongo,
}

impl RemoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wandb => "wandb",
            Self::Mlflow => "mlflow",
            Self::Tensorboard => "tensorboard",
            Self::Mongo => "mongo",
        }
    }
}

impl fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote backend configuration: universal key options plus the service's
/// native init parameters.
///
/// `key_map` and `key_prefix` are consumed by [`KeyOptions`]; everything
/// else lands in `params` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(flatten)]
    pub keys: KeyOptions,
    #[serde(flatten)]
    pub params: Fields,
}

impl RemoteConfig {
    pub fn new(params: Fields) -> Self {
        Self {
            keys: KeyOptions::default(),
            params,
        }
    }

    #[must_use]
    pub fn with_keys(mut self, keys: KeyOptions) -> Self {
        self.keys = keys;
        self
    }
}

/// One call into a remote service, in the service's native shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RemoteCall {
    /// Open a run / writer / connection with native parameters
    Init { params: Fields },
    /// Merge into the run config (wandb)
    UpdateConfig { config: Fields },
    /// Record run parameters (mlflow)
    LogParams { params: Fields },
    /// Log a step-indexed set of metrics
    LogMetrics { metrics: Fields, step: Value },
    /// One scalar series point (tensorboard)
    AddScalar {
        tag: String,
        value: Value,
        global_step: Option<Value>,
        walltime: Option<Value>,
    },
    /// Hyperparameters with their associated metrics (tensorboard)
    AddHparams {
        hparams: Fields,
        metrics: Fields,
        name: Option<String>,
        global_step: Option<Value>,
    },
    /// Insert a document into a collection (mongo)
    InsertDocument { document: Fields },
}

/// Transport to a remote service.
pub trait RemoteClient: Send {
    fn send(&mut self, call: RemoteCall) -> Result<()>;
}

/// In-memory client that records every call.
///
/// Clones share the same call log, so a test can keep one handle and hand
/// another to a backend.
#[derive(Debug, Clone, Default)]
pub struct RecordingClient {
    calls: Arc<Mutex<Vec<RemoteCall>>>,
    reject: Option<String>,
}

impl RecordingClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that accepts `Init` but fails every other call.
    #[must_use]
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            calls: Arc::default(),
            reject: Some(message.into()),
        }
    }

    /// Snapshot of the calls received so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl RemoteClient for RecordingClient {
    fn send(&mut self, call: RemoteCall) -> Result<()> {
        if let Some(message) = &self.reject {
            if !matches!(call, RemoteCall::Init { .. }) {
                return Err(Error::backend("recording", message.clone()));
            }
        }
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(call);
        Ok(())
    }
}

fn require_params(kind: RemoteKind, params: &Fields, keys: &[&str]) -> Result<()> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|key| !params.contains_key(*key))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{kind} backend requires parameters: {}",
            missing.join(", ")
        )))
    }
}

fn take_required(fields: &mut Fields, key: &str, kind: RemoteKind) -> Result<Value> {
    take_key(fields, key).ok_or_else(|| Error::MissingRequiredKey {
        backend: kind.to_string(),
        key: key.to_string(),
    })
}

/// Adapter for step-indexed services (wandb, mlflow).
///
/// Config records update the run config; metric records must carry
/// [`STEP_KEY`] after key mapping. Other kinds are not supported by these
/// services and are dropped.
pub struct StepMetricBackend {
    kind: RemoteKind,
    client: Box<dyn RemoteClient>,
    filter: KeyFilter,
}

impl StepMetricBackend {
    pub fn wandb(config: RemoteConfig, client: Box<dyn RemoteClient>) -> Result<Self> {
        Self::connect(RemoteKind::Wandb, config, client)
    }

    pub fn mlflow(config: RemoteConfig, client: Box<dyn RemoteClient>) -> Result<Self> {
        Self::connect(RemoteKind::Mlflow, config, client)
    }

    fn connect(
        kind: RemoteKind,
        config: RemoteConfig,
        mut client: Box<dyn RemoteClient>,
    ) -> Result<Self> {
        client.send(RemoteCall::Init {
            params: config.params,
        })?;
        Ok(Self {
            kind,
            client,
            filter: KeyFilter::new(config.keys).skip_reserved(),
        })
    }

    pub fn kind(&self) -> RemoteKind {
        self.kind
    }
}

impl Backend for StepMetricBackend {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        match record.kind() {
            RecordKind::Config => {
                let config = self.filter.prepare(record.fields());
                let call = match self.kind {
                    RemoteKind::Mlflow => RemoteCall::LogParams { params: config },
                    _ => RemoteCall::UpdateConfig { config },
                };
                self.client.send(call)
            }
            RecordKind::Metric => {
                // step is looked up before prefixing so namespaced metrics keep it
                let mut metrics = self.filter.select(&self.filter.rename(record.fields()));
                let step = take_required(&mut metrics, STEP_KEY, self.kind)?;
                let metrics = self.filter.apply_prefix(metrics);
                self.client.send(RemoteCall::LogMetrics { metrics, step })
            }
            _ => Ok(()),
        }
    }
}

/// Tensorboard adapter: scalars for metrics, hparams for configs.
pub struct TensorboardBackend {
    client: Box<dyn RemoteClient>,
    filter: KeyFilter,
}

impl TensorboardBackend {
    /// Requires a `logdir` parameter, which is created if absent.
    pub fn new(config: RemoteConfig, mut client: Box<dyn RemoteClient>) -> Result<Self> {
        require_params(RemoteKind::Tensorboard, &config.params, &["logdir"])?;
        if let Some(logdir) = config.params.get("logdir").and_then(Value::as_str) {
            std::fs::create_dir_all(logdir)
                .map_err(|e| Error::io(format!("creating {logdir}"), e))?;
        }
        client.send(RemoteCall::Init {
            params: config.params,
        })?;
        Ok(Self {
            client,
            filter: KeyFilter::new(config.keys).skip_reserved(),
        })
    }

    fn write_metric(&mut self, record: &Record) -> Result<()> {
        let mut metric = self.filter.select(&self.filter.rename(record.fields()));
        let global_step = take_key(&mut metric, "global_step");
        let walltime = take_key(&mut metric, "walltime");
        let tag = take_key(&mut metric, "tag").or_else(|| take_key(&mut metric, "main_tag"));
        let main_tag = match tag {
            Some(Value::String(tag)) => format!("{tag}{TAG_SEPARATOR}"),
            Some(other) => format!("{other}{TAG_SEPARATOR}"),
            None => String::new(),
        };

        let scalars = self.filter.apply_prefix(flatten(&metric, TAG_SEPARATOR));
        for (key, value) in scalars {
            if !value.is_number() {
                tracing::debug!(key = %key, "skipping non-numeric tensorboard scalar");
                continue;
            }
            self.client.send(RemoteCall::AddScalar {
                tag: format!("{main_tag}{key}"),
                value,
                global_step: global_step.clone(),
                walltime: walltime.clone(),
            })?;
        }
        Ok(())
    }

    fn write_config(&mut self, record: &Record) -> Result<()> {
        let mut config = record.fields().clone();
        let name = take_key(&mut config, "name").map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });
        let metrics = match take_key(&mut config, "metric_dict") {
            Some(Value::Object(dict)) => self.filter.prepare_metric(&dict),
            _ => Fields::new(),
        };
        let global_step = take_key(&mut config, "global_step");

        let hparams = self
            .filter
            .prepare(&config)
            .into_iter()
            .map(|(key, value)| match value {
                Value::Null => (key, Value::String("None".to_string())),
                other => (key, other),
            })
            .collect();

        self.client.send(RemoteCall::AddHparams {
            hparams,
            metrics,
            name,
            global_step,
        })
    }
}

impl Backend for TensorboardBackend {
    fn name(&self) -> &str {
        RemoteKind::Tensorboard.as_str()
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        match record.kind() {
            RecordKind::Metric => self.write_metric(record),
            RecordKind::Config => self.write_config(record),
            _ => Ok(()),
        }
    }
}

/// Document-store adapter: config, message and metadata records are
/// inserted whole, reserved keys included. Metrics are not stored.
pub struct MongoBackend {
    client: Box<dyn RemoteClient>,
    filter: KeyFilter,
}

impl MongoBackend {
    /// Requires `host`, `port`, `db` and `collection` parameters.
    pub fn new(config: RemoteConfig, mut client: Box<dyn RemoteClient>) -> Result<Self> {
        require_params(
            RemoteKind::Mongo,
            &config.params,
            &["host", "port", "db", "collection"],
        )?;
        client.send(RemoteCall::Init {
            params: config.params,
        })?;
        Ok(Self {
            client,
            filter: KeyFilter::new(config.keys),
        })
    }
}

impl Backend for MongoBackend {
    fn name(&self) -> &str {
        RemoteKind::Mongo.as_str()
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        match record.kind() {
            RecordKind::Config | RecordKind::Message | RecordKind::Metadata => {
                self.client.send(RemoteCall::InsertDocument {
                    document: self.filter.prepare(record.fields()),
                })
            }
            _ => Ok(()),
        }
    }
}

//! LogBook dispatcher
//!
//! Stamps every record with the logbook id, a timestamp and its kind, then
//! writes it to each configured backend in order.
//!
//! # Example
//!
//! ```
//! use logbook::{make_config, LogBook};
//! use serde_json::json;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let mut book = LogBook::new(make_config("run-1", "demo", Some(dir.path().to_path_buf())))?;
//!
//! book.write_config(json!({"lr": 0.01}).as_object().unwrap())?;
//! book.write_metric(json!({"loss": 0.5, "step": 1}).as_object().unwrap())?;
//! book.write_message("epoch finished")?;
//!
//! let experiment = logbook::parse_experiment(dir.path())?;
//! assert_eq!(experiment.configs.len(), 1);
//! # Ok(())
//! # }
//! ```

mod config;


use std::fmt;

use serde_json::Value;

use crate::backend::{
    Backend, FilesystemBackend, MongoBackend, RemoteClient, RemoteConfig, RemoteKind,
    StepMetricBackend, TensorboardBackend,
};
use crate::error::{Error, Result};
use crate::record::{stamp, Fields, RecordKind};

pub use config::{make_config, BackendConfigs, LogBookConfig};

/// Opens clients for remote backends named in the configuration.
pub trait ClientFactory {
    fn connect(&mut self, kind: RemoteKind, params: &Fields) -> Result<Box<dyn RemoteClient>>;
}

impl<F> ClientFactory for F
where
    F: FnMut(RemoteKind, &Fields) -> Result<Box<dyn RemoteClient>>,
{
    fn connect(&mut self, kind: RemoteKind, params: &Fields) -> Result<Box<dyn RemoteClient>> {
        self(kind, params)
    }
}

/// Factory for builds without remote transports: any configured remote
/// backend is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemoteClients;

impl ClientFactory for NoRemoteClients {
    fn connect(&mut self, kind: RemoteKind, _params: &Fields) -> Result<Box<dyn RemoteClient>> {
        Err(Error::UnsupportedBackend {
            backend: kind.to_string(),
        })
    }
}

/// Stamps records and fans them out to every backend.
pub struct LogBook {
    id: String,
    name: String,
    config: Option<Fields>,
    backends: Vec<Box<dyn Backend>>,
}

impl fmt::Debug for LogBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBook")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("backends", &self.backend_names())
            .finish()
    }
}

impl LogBook {
    /// Build from configuration. Remote backends are rejected; use
    /// [`LogBook::with_clients`] to supply their transports.
    pub fn new(config: LogBookConfig) -> Result<Self> {
        Self::with_clients(config, &mut NoRemoteClients)
    }

    /// Build from configuration, opening remote clients through `factory`.
    ///
    /// Backends are instantiated filesystem first, then wandb, mlflow,
    /// tensorboard and mongo; records are written in the same order.
    pub fn with_clients(config: LogBookConfig, factory: &mut dyn ClientFactory) -> Result<Self> {
        let LogBookConfig {
            id,
            name,
            config,
            loggers,
        } = config;

        let mut backends: Vec<Box<dyn Backend>> = Vec::new();
        if let Some(fs_config) = loggers.filesystem {
            backends.push(Box::new(FilesystemBackend::new(fs_config)?));
        }
        if let Some(remote) = loggers.wandb {
            let client = connect(factory, RemoteKind::Wandb, &remote)?;
            backends.push(Box::new(StepMetricBackend::wandb(remote, client)?));
        }
        if let Some(remote) = loggers.mlflow {
            let client = connect(factory, RemoteKind::Mlflow, &remote)?;
            backends.push(Box::new(StepMetricBackend::mlflow(remote, client)?));
        }
        if let Some(remote) = loggers.tensorboard {
            let client = connect(factory, RemoteKind::Tensorboard, &remote)?;
            backends.push(Box::new(TensorboardBackend::new(remote, client)?));
        }
        if let Some(remote) = loggers.mongo {
            let client = connect(factory, RemoteKind::Mongo, &remote)?;
            backends.push(Box::new(MongoBackend::new(remote, client)?));
        }

        let book = Self {
            id,
            name,
            config,
            backends,
        };
        tracing::debug!(
            id = %book.id,
            name = %book.name,
            backends = ?book.backend_names(),
            "logbook ready"
        );
        Ok(book)
    }

    /// Build directly from backend instances.
    pub fn from_backends(
        id: impl Into<String>,
        name: impl Into<String>,
        backends: Vec<Box<dyn Backend>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: None,
            backends,
        }
    }

    /// Set the experiment config used by [`LogBook::write_experiment_config`].
    #[must_use]
    pub fn with_config(mut self, config: Fields) -> Self {
        self.config = Some(config);
        self
    }

    /// Append a backend after the existing ones.
    pub fn add_backend(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> Option<&Fields> {
        self.config.as_ref()
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Stamp a copy of `fields` and write it to every backend in order.
    ///
    /// Not transactional: when backend *k* fails, backends before it have
    /// already written the record and later ones are not attempted.
    pub fn write(&mut self, fields: &Fields, kind: RecordKind) -> Result<()> {
        let record = stamp(fields, &self.id, kind);
        for backend in &mut self.backends {
            backend.write(&record)?;
        }
        Ok(())
    }

    pub fn write_config(&mut self, config: &Fields) -> Result<()> {
        self.write(config, RecordKind::Config)
    }

    /// Write the config this logbook was built with.
    ///
    /// An empty config is written when none was provided.
    pub fn write_experiment_config(&mut self) -> Result<()> {
        let config = self.config.clone().unwrap_or_default();
        self.write(&config, RecordKind::Config)
    }

    pub fn write_metric(&mut self, metric: &Fields) -> Result<()> {
        self.write(metric, RecordKind::Metric)
    }

    pub fn write_metadata(&mut self, metadata: &Fields) -> Result<()> {
        self.write(metadata, RecordKind::Metadata)
    }

    /// Write any payload wrapped as `{"message": payload}`.
    pub fn write_message(&mut self, message: impl Into<Value>) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("message".to_string(), message.into());
        self.write(&fields, RecordKind::Message)
    }

    /// Flush every backend.
    pub fn flush(&mut self) -> Result<()> {
        for backend in &mut self.backends {
            backend.flush()?;
        }
        Ok(())
    }
}

fn connect(
    factory: &mut dyn ClientFactory,
    kind: RemoteKind,
    remote: &RemoteConfig,
) -> Result<Box<dyn RemoteClient>> {
    let client = factory.connect(kind, &remote.params)?;
    tracing::debug!(backend = %kind, "remote client connected");
    Ok(client)
}

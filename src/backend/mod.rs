//! Backend contract
//!
//! Every sink a [`LogBook`](crate::LogBook) fans out to implements
//! [`Backend`]. Key selection and renaming are shared through
//! [`KeyFilter`], which each backend owns and configures at construction.
//!
//! - **`FilesystemBackend`**: append-only JSON lines, one file per kind or one file total
//! - **Remote adapters**: translate records into [`RemoteCall`]s for a [`RemoteClient`]

mod filesystem;
mod remote;


use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::record::{is_reserved, Fields, Record, RESERVED_KEYS};

pub use filesystem::{log_file_name, FilesystemBackend, FilesystemConfig};
pub use remote::{
    MongoBackend, RecordingClient, RemoteCall, RemoteClient, RemoteConfig, RemoteKind,
    StepMetricBackend, TensorboardBackend, STEP_KEY,
};

/// A sink for stamped records.
pub trait Backend: Send {
    /// Short name used in error messages.
    fn name(&self) -> &str;

    /// Persist or forward one stamped record.
    ///
    /// Kinds the backend does not support are ignored and return `Ok(())`.
    fn write(&mut self, record: &Record) -> Result<()>;

    /// Flush buffered output, if any.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Universal per-backend options, consumed before any native parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOptions {
    /// Rename `old -> new`, applied to metric records only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_map: Option<BTreeMap<String, String>>,
    /// Prefix for every non-reserved key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

/// Key selection, renaming and prefixing for one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    retain: Option<Vec<String>>,
    skip: Vec<String>,
    key_map: BTreeMap<String, String>,
    key_prefix: Option<String>,
}

impl KeyFilter {
    pub fn new(options: KeyOptions) -> Self {
        Self {
            retain: None,
            skip: Vec::new(),
            key_map: options.key_map.unwrap_or_default(),
            key_prefix: options.key_prefix.filter(|p| !p.is_empty()),
        }
    }

    /// Keep only these keys. All keys are kept by default.
    #[must_use]
    pub fn retain_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retain = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Drop these keys after retention.
    #[must_use]
    pub fn skip_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Drop the three reserved stamping keys.
    #[must_use]
    pub fn skip_reserved(self) -> Self {
        self.skip_keys(RESERVED_KEYS)
    }

    /// Retain/skip selection only.
    pub fn select(&self, fields: &Fields) -> Fields {
        let selected: Fields = match &self.retain {
            None => fields.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|key| fields.get(key).map(|value| (key.clone(), value.clone())))
                .collect(),
        };
        if self.skip.is_empty() {
            return selected;
        }
        selected
            .into_iter()
            .filter(|(key, _)| !self.skip.contains(key))
            .collect()
    }

    /// Apply the key map. Absent source keys are left alone; a renamed key
    /// replaces any existing key of the same name.
    pub fn rename(&self, fields: &Fields) -> Fields {
        if self.key_map.is_empty() {
            return fields.clone();
        }
        let targets: HashSet<&str> = self
            .key_map
            .iter()
            .filter(|(old, _)| fields.contains_key(old.as_str()))
            .map(|(_, new)| new.as_str())
            .collect();
        fields
            .iter()
            .filter_map(|(key, value)| match self.key_map.get(key) {
                Some(new) => Some((new.clone(), value.clone())),
                None if targets.contains(key.as_str()) => None,
                None => Some((key.clone(), value.clone())),
            })
            .collect()
    }

    /// Prefix every non-reserved key.
    pub fn apply_prefix(&self, fields: Fields) -> Fields {
        let Some(prefix) = &self.key_prefix else {
            return fields;
        };
        fields
            .into_iter()
            .map(|(key, value)| {
                if is_reserved(&key) {
                    (key, value)
                } else {
                    (format!("{prefix}{key}"), value)
                }
            })
            .collect()
    }

    /// Selection followed by prefixing.
    pub fn prepare(&self, fields: &Fields) -> Fields {
        self.apply_prefix(self.select(fields))
    }

    /// Renaming, then selection, then prefixing.
    pub fn prepare_metric(&self, fields: &Fields) -> Fields {
        self.apply_prefix(self.select(&self.rename(fields)))
    }
}

/// Remove `key` from `fields`, keeping the order of the remaining entries.
pub(crate) fn take_key(fields: &mut Fields, key: &str) -> Option<Value> {
    let value = fields.get(key).cloned()?;
    *fields = std::mem::take(fields)
        .into_iter()
        .filter(|(k, _)| k != key)
        .collect();
    Some(value)
}

// ── DataConfig ──
//
// Static description of one backend resource: where it lives, which
// operations it accepts and how its reads are reused. A config points
// either at a single URL or at a batch of leaf calls, never both.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::{BlobClass, Operation, ReusePolicy};
use crate::error::CoreError;

/// One leaf of a batch request. `identifier` is the fan-in join key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCall {
    pub url: String,
    pub identifier: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse: Option<ReusePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_class: Option<BlobClass>,
}

impl BatchCall {
    pub fn new(identifier: impl Into<String>, url: impl Into<String>, operation: Operation) -> Self {
        Self {
            url: url.into(),
            identifier: identifier.into(),
            operation,
            reuse: None,
            blob_class: None,
        }
    }

    pub fn with_reuse(mut self, reuse: ReusePolicy) -> Self {
        self.reuse = Some(reuse);
        self
    }

    pub fn with_blob_class(mut self, class: impl Into<BlobClass>) -> Self {
        self.blob_class = Some(class.into());
        self
    }
}

/// Where a config's data comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Url(String),
    Batch(Vec<BatchCall>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub source: DataSource,
    /// Operations permitted in addition to the dispatcher's allowed methods.
    pub allowed_operations: BTreeSet<Operation>,
    pub default_operation: Operation,
    pub reuse: ReusePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_tag: Option<String>,
}

impl DataConfig {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self::with_source(DataSource::Url(url.into()))
    }

    pub fn for_batch(calls: Vec<BatchCall>) -> Self {
        Self::with_source(DataSource::Batch(calls))
    }

    fn with_source(source: DataSource) -> Self {
        Self {
            source,
            allowed_operations: BTreeSet::new(),
            default_operation: Operation::Get,
            reuse: ReusePolicy::default(),
            socket_tag: None,
        }
    }

    pub fn allow(mut self, operation: Operation) -> Self {
        self.allowed_operations.insert(operation);
        self
    }

    pub fn allow_all(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.allowed_operations.extend(operations);
        self
    }

    pub fn default_operation(mut self, operation: Operation) -> Self {
        self.default_operation = operation;
        self
    }

    pub fn reuse(mut self, reuse: ReusePolicy) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn socket_tag(mut self, tag: impl Into<String>) -> Self {
        self.socket_tag = Some(tag.into());
        self
    }

    pub fn url(&self) -> Option<&str> {
        match &self.source {
            DataSource::Url(url) => Some(url),
            DataSource::Batch(_) => None,
        }
    }

    pub fn batch(&self) -> Option<&[BatchCall]> {
        match &self.source {
            DataSource::Batch(calls) => Some(calls),
            DataSource::Url(_) => None,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.source, DataSource::Batch(_))
    }

    /// Check the structural invariants of this config.
    pub fn validate(&self) -> Result<(), CoreError> {
        match &self.source {
            DataSource::Url(url) => {
                if url.trim().is_empty() {
                    return Err(CoreError::invalid("data config url is empty"));
                }
            }
            DataSource::Batch(calls) => {
                if calls.is_empty() {
                    return Err(CoreError::invalid("batch override has no calls"));
                }
                let mut seen = HashSet::new();
                for call in calls {
                    if call.identifier.is_empty() {
                        return Err(CoreError::invalid("batch call identifier is empty"));
                    }
                    if call.url.trim().is_empty() {
                        return Err(CoreError::invalid(format!(
                            "batch call '{}' has an empty url",
                            call.identifier
                        )));
                    }
                    if !seen.insert(call.identifier.as_str()) {
                        return Err(CoreError::invalid(format!(
                            "duplicate batch identifier '{}'",
                            call.identifier
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

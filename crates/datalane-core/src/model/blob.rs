// ── Typed blobs ──
//
// A blob is a response wrapped with the name of the type the view
// expects. The fallback processor builds one per response (or one per
// element for list operations).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Operation;

/// Named type tag attached to delivered data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobClass(Arc<str>);

impl BlobClass {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Wrap a raw response according to the operation that produced it.
    ///
    /// List operations produce one blob per array element; a non-array
    /// list response becomes a single-element list.
    pub fn build(&self, operation: Operation, response: &Value) -> DataPayload {
        if operation.is_list() {
            let items = match response {
                Value::Array(items) => items.iter().map(|v| self.blob(v.clone())).collect(),
                other => vec![self.blob(other.clone())],
            };
            DataPayload::List(items)
        } else {
            DataPayload::Single(self.blob(response.clone()))
        }
    }

    fn blob(&self, data: Value) -> Blob {
        Blob {
            class: self.clone(),
            data,
        }
    }
}

impl fmt::Display for BlobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobClass {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A response tagged with its blob class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Blob {
    pub class: BlobClass,
    pub data: Value,
}

/// What a view receives through `handle_data_change`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataPayload {
    Single(Blob),
    List(Vec<Blob>),
    /// No blob class configured: the response as received.
    Raw(Value),
}

impl DataPayload {
    /// Build the payload for a response, with or without a blob class.
    pub fn from_response(
        blob_class: Option<&BlobClass>,
        operation: Operation,
        response: &Value,
    ) -> Self {
        match blob_class {
            Some(class) => class.build(operation, response),
            None => Self::Raw(response.clone()),
        }
    }

    /// Strip blob wrappers, returning the underlying JSON.
    pub fn into_value(self) -> Value {
        match self {
            Self::Single(blob) => blob.data,
            Self::List(blobs) => Value::Array(blobs.into_iter().map(|b| b.data).collect()),
            Self::Raw(v) => v,
        }
    }
}

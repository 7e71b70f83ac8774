// ── Delivered outcomes ──
//
// Values that cross from the orchestration layer into views.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::DataPayload;
use crate::error::{CoreError, UNAUTHORIZED_STATUS};

/// What a view receives through `handle_data_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataError {
    pub message: String,
    #[serde(rename = "statusCode", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl DataError {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    /// The fixed error delivered when an operation is not permitted.
    pub fn unauthorized() -> Self {
        Self::new("Unauthorized Request", Some(UNAUTHORIZED_STATUS))
    }
}

impl From<&CoreError> for DataError {
    fn from(err: &CoreError) -> Self {
        let message = match err {
            CoreError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::new(message, err.status())
    }
}

impl From<CoreError> for DataError {
    fn from(err: CoreError) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Resolved slot of one batch or bulk leaf.
///
/// Serializes as `{"success": …}` or `{"error": …}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafOutcome {
    Success(DataPayload),
    Error(DataError),
}

impl LeafOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(&self) -> Option<&DataPayload> {
        match self {
            Self::Success(data) => Some(data),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&DataError> {
        match self {
            Self::Error(err) => Some(err),
            Self::Success(_) => None,
        }
    }
}

/// Identifier-keyed results of a batch call, in declaration order.
pub type BatchResults = IndexMap<String, LeafOutcome>;

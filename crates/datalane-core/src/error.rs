// ── Core error types ──
//
// Errors surfaced by the orchestration layer. Configuration errors are
// returned synchronously from `Dispatcher::enqueue`; everything else is
// flattened into a `DataError` and delivered through the processor's
// error channel. The `From<datalane_api::Error>` impl translates
// transport-layer failures into domain-appropriate variants.

use thiserror::Error;

use crate::model::Operation;
use crate::store::StoreError;

/// HTTP status reported for operations the entity does not permit.
pub const UNAUTHORIZED_STATUS: u16 = 405;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Invalid entity configuration: {message}")]
    InvalidConfig { message: String },

    // ── Authorization ────────────────────────────────────────────────
    #[error("Unauthorized Request")]
    Unauthorized { operation: Operation },

    // ── Backend errors (wrapped, not exposed raw) ────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Cannot reach backend: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Reuse cache ──────────────────────────────────────────────────
    #[error("No reusable response for {key}")]
    CacheMiss { key: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// HTTP-style status code for the error channel.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(UNAUTHORIZED_STATUS),
            Self::Api { status, .. } => *status,
            Self::Timeout { .. } => Some(408),
            Self::CacheMiss { .. } => Some(404),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<datalane_api::Error> for CoreError {
    fn from(err: datalane_api::Error) -> Self {
        match err {
            datalane_api::Error::Http { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            datalane_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            datalane_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            datalane_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            datalane_api::Error::InvalidUrl(e) => CoreError::InvalidConfig {
                message: format!("invalid URL: {e}"),
            },
        }
    }
}

//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError`, `ConfigError` and delivered `DataError`s into
//! user-facing errors with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use datalane_config::ConfigError;
use datalane_core::{CoreError, DataError, UNAUTHORIZED_STATUS};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNAUTHORIZED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach backend: {reason}")]
    #[diagnostic(
        code(datalane::connection_failed),
        help(
            "Check that the backend is running and the base URL is right.\n\
             Self-signed certificates need --insecure (-k) or ca_cert in the profile."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Backend responses ────────────────────────────────────────────
    #[error("Operation '{operation}' is not allowed on entity '{entity}'")]
    #[diagnostic(
        code(datalane::unauthorized),
        help(
            "Add it to `allowed_operations` for the entity, or allow its\n\
             HTTP method under [dispatcher] allowed_methods."
        )
    )]
    Unauthorized { operation: String, entity: String },

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(datalane::not_found),
        help("Run: datalane {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Backend error ({status}): {message}")]
    #[diagnostic(code(datalane::api_error))]
    ApiError { status: u16, message: String },

    #[error("{failed} of {total} requests failed")]
    #[diagnostic(
        code(datalane::partial_failure),
        help("Failed entries are listed above with their status and message.")
    )]
    PartialFailure { failed: usize, total: usize },

    #[error("Request failed: {message}")]
    #[diagnostic(code(datalane::request_failed))]
    RequestFailed { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(datalane::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(datalane::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: datalane config init --base-url <URL> --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(datalane::no_config),
        help(
            "Create a profile with: datalane config init --base-url <URL>\n\
             or pass --base-url. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(datalane::config))]
    Config(Box<figment::Error>),

    #[error("Profile '{name}' already exists in {path}")]
    #[diagnostic(
        code(datalane::profile_exists),
        help("Use --force to replace it.")
    )]
    ProfileExists { name: String, path: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(datalane::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("{message}")]
    #[diagnostic(
        code(datalane::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    TimedOut { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(datalane::json), help("Check the JSON and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(datalane::render))]
    Render(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Unauthorized { .. } => exit_code::UNAUTHORIZED,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } | Self::TimedOut { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::Config(_)
            | Self::ProfileExists { .. } => exit_code::CONFIG,
            _ => exit_code::GENERAL,
        }
    }

    /// Translate an error delivered through a view or processor.
    pub fn from_delivered(err: DataError, operation: &str, entity: &str) -> Self {
        match err.status {
            Some(UNAUTHORIZED_STATUS) => Self::Unauthorized {
                operation: operation.into(),
                entity: entity.into(),
            },
            Some(404) => Self::NotFound {
                resource_type: "resource".into(),
                identifier: entity.into(),
                list_command: "entities".into(),
            },
            Some(408) => Self::TimedOut {
                message: err.message,
            },
            Some(status) => Self::ApiError {
                status,
                message: err.message,
            },
            None => Self::RequestFailed {
                message: err.message,
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidConfig { message } => CliError::Validation {
                field: "entity".into(),
                reason: message,
            },

            CoreError::Unauthorized { operation } => CliError::Unauthorized {
                operation: operation.to_string(),
                entity: "(unknown)".into(),
            },

            CoreError::Api {
                message,
                status: Some(status),
            } => CliError::ApiError { status, message },

            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::CacheMiss { key } => CliError::NotFound {
                resource_type: "cache entry".into(),
                identifier: key,
                list_command: "cache list".into(),
            },

            CoreError::Api {
                message,
                status: None,
            }
            | CoreError::Internal(message) => CliError::RequestFailed { message },

            CoreError::Storage(e) => CliError::RequestFailed {
                message: e.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownEntity { name } => CliError::NotFound {
                resource_type: "entity".into(),
                identifier: name,
                list_command: "entities".into(),
            },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
            ConfigError::Serialization(e) => CliError::Render(e.to_string()),
        }
    }
}

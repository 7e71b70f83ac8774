//! Shared helpers for command handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use datalane_core::{BatchResults, DataError, DataPayload, DataView, LeafOutcome};

use crate::error::CliError;

// ── Channel-backed view ─────────────────────────────────────────────

/// One delivery to a [`ChannelView`].
#[derive(Debug)]
pub enum ViewEvent {
    Data(DataPayload),
    Error(DataError),
    Batch(BatchResults),
    Bulk(Vec<LeafOutcome>),
}

/// A `DataView` that forwards every delivery over an mpsc channel so a
/// command can await the result.
pub struct ChannelView {
    tx: mpsc::UnboundedSender<ViewEvent>,
}

impl ChannelView {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<ViewEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, event: ViewEvent) {
        // Receiver gone means the command already gave up waiting.
        let _ = self.tx.send(event);
    }
}

impl DataView for ChannelView {
    fn handle_data_change(&self, data: DataPayload) {
        self.send(ViewEvent::Data(data));
    }

    fn handle_data_error(&self, error: DataError) {
        self.send(ViewEvent::Error(error));
    }

    fn handle_batch_data(&self, results: BatchResults) {
        self.send(ViewEvent::Batch(results));
    }

    fn handle_bulk_data(&self, results: Vec<LeafOutcome>) {
        self.send(ViewEvent::Bulk(results));
    }
}

/// Wait for the next delivery, giving up after `request_timeout` plus a
/// grace period for queued writes ahead of this one.
pub async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<ViewEvent>,
    request_timeout: Duration,
) -> Result<ViewEvent, CliError> {
    let deadline = request_timeout + Duration::from_secs(5);
    match tokio::time::timeout(deadline, rx.recv()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(CliError::RequestFailed {
            message: "dispatcher dropped the request".into(),
        }),
        Err(_) => Err(CliError::Timeout {
            seconds: deadline.as_secs(),
        }),
    }
}

// ── Payload parsing ─────────────────────────────────────────────────

/// Turn `KEY=VALUE` pairs into a JSON object. Values that parse as JSON
/// keep their type, anything else is a string. No pairs means no payload.
pub fn parse_params(params: &[String]) -> Result<Option<Value>, CliError> {
    if params.is_empty() {
        return Ok(None);
    }
    let mut map = Map::new();
    for param in params {
        let (key, raw) = param.split_once('=').ok_or_else(|| CliError::Validation {
            field: "param".into(),
            reason: format!("expected KEY=VALUE, got '{param}'"),
        })?;
        if key.is_empty() {
            return Err(CliError::Validation {
                field: "param".into(),
                reason: format!("empty key in '{param}'"),
            });
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
        map.insert(key.to_owned(), value);
    }
    Ok(Some(Value::Object(map)))
}

/// Parse an inline `--data` argument.
pub fn parse_json_arg(raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::Validation {
        field: "data".into(),
        reason: format!("invalid JSON: {e}"),
    })
}

/// Read and parse a JSON file for `--from-file` flags.
pub fn read_json_file(path: &Path) -> Result<Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CliError::Validation {
        field: "from-file".into(),
        reason: format!("invalid JSON: {e}"),
    })
}

//! Data command handlers: `get`, `send`, `batch` and `bulk`.
//!
//! Each handler binds the configured entity to a [`ChannelView`],
//! enqueues it on the dispatcher and renders whatever the view receives.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};
use tabled::Tabled;

use datalane_core::{EnqueueOptions, LeafOutcome, Operation};

use crate::cli::{BatchArgs, BulkArgs, GetArgs, GlobalOpts, OutputFormat, SendArgs};
use crate::config::{self, Config, Session};
use crate::error::CliError;
use crate::output;

use super::util::{self, ChannelView, ViewEvent};

// ── Single entity ───────────────────────────────────────────────────

pub async fn get(
    args: GetArgs,
    session: &Session,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    reject_batch(cfg, &args.entity)?;
    let (view, mut rx) = ChannelView::channel();
    let entity = config::entity_config(cfg, &args.entity, view)?;
    let operation = args
        .operation
        .map_or(entity.data_config().default_operation, Operation::from);
    if !operation.is_read() {
        return Err(CliError::Validation {
            field: "operation".into(),
            reason: format!(
                "'{}' defaults to '{operation}'; use `datalane send {operation} {}`",
                args.entity, args.entity
            ),
        });
    }
    let payload = util::parse_params(&args.params)?;

    if args.fresh {
        if let Some(url) = entity.url() {
            session.dispatcher.invalidate(url, payload.as_ref()).await?;
        }
    }

    tracing::debug!(entity = %args.entity, %operation, "enqueueing read");
    session
        .dispatcher
        .enqueue(Some(operation), entity, payload, EnqueueOptions::default())?;

    let event = util::next_event(&mut rx, session.request_timeout).await?;
    render_delivery(event, operation, &args.entity, global)
}

pub async fn send(
    args: SendArgs,
    session: &Session,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    reject_batch(cfg, &args.entity)?;
    let operation = Operation::from(args.operation);
    let body = match (&args.data, &args.from_file) {
        (Some(raw), _) => Some(util::parse_json_arg(raw)?),
        (None, Some(path)) => Some(util::read_json_file(path)?),
        (None, None) => None,
    };

    let (view, mut rx) = ChannelView::channel();
    let entity = config::entity_config(cfg, &args.entity, view)?;

    tracing::debug!(entity = %args.entity, %operation, "enqueueing write");
    session
        .dispatcher
        .enqueue(Some(operation), entity, body, EnqueueOptions::default())?;

    let event = util::next_event(&mut rx, session.request_timeout).await?;
    render_delivery(event, operation, &args.entity, global)
}

fn reject_batch(cfg: &Config, name: &str) -> Result<(), CliError> {
    if cfg.entity(name)?.is_batch() {
        return Err(CliError::Validation {
            field: "entity".into(),
            reason: format!("'{name}' is a batch entity; run: datalane batch {name}"),
        });
    }
    Ok(())
}

fn render_delivery(
    event: ViewEvent,
    operation: Operation,
    entity: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match event {
        ViewEvent::Data(payload) => {
            let out = output::render_value(&global.format(), &payload.into_value())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        ViewEvent::Error(err) => Err(CliError::from_delivered(
            err,
            &operation.to_string(),
            entity,
        )),
        ViewEvent::Batch(_) | ViewEvent::Bulk(_) => Err(CliError::RequestFailed {
            message: format!("unexpected aggregate delivery for '{entity}'"),
        }),
    }
}

// ── Batch / bulk ────────────────────────────────────────────────────

pub async fn batch(
    args: BatchArgs,
    session: &Session,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !cfg.entity(&args.entity)?.is_batch() {
        return Err(CliError::Validation {
            field: "entity".into(),
            reason: format!(
                "'{}' has no batch calls; run: datalane get {}",
                args.entity, args.entity
            ),
        });
    }
    let (view, mut rx) = ChannelView::channel();
    let entity = config::entity_config(cfg, &args.entity, view)?;
    let payload = util::parse_params(&args.params)?;

    session
        .dispatcher
        .enqueue(None, entity, payload, EnqueueOptions::default())?;

    match util::next_event(&mut rx, session.request_timeout).await? {
        ViewEvent::Batch(results) => {
            let reports: Vec<LeafReport> = results
                .into_iter()
                .map(|(key, outcome)| LeafReport::new(key, outcome))
                .collect();
            let out = match global.format() {
                OutputFormat::Table | OutputFormat::Plain => {
                    render_reports(global, &reports)?
                }
                format => {
                    let keyed: IndexMap<&str, &Value> =
                        reports.iter().map(|r| (r.key.as_str(), &r.outcome)).collect();
                    output::render_single(&format, &keyed, |_| String::new(), |_| String::new())?
                }
            };
            output::print_output(&out, global.quiet);
            check_failures(&reports)
        }
        ViewEvent::Error(err) => Err(CliError::from_delivered(err, "batch", &args.entity)),
        ViewEvent::Data(_) | ViewEvent::Bulk(_) => Err(CliError::RequestFailed {
            message: format!("unexpected delivery for batch '{}'", args.entity),
        }),
    }
}

pub async fn bulk(
    args: BulkArgs,
    session: &Session,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (view, mut rx) = ChannelView::channel();
    let mut entities = Vec::with_capacity(args.entities.len());
    for name in &args.entities {
        reject_batch(cfg, name)?;
        entities.push(config::entity_config(cfg, name, view.clone())?);
    }
    let payload = util::parse_params(&args.params)?;

    session.dispatcher.enqueue(
        None,
        entities,
        payload,
        EnqueueOptions::default().with_caller_view(view),
    )?;

    match util::next_event(&mut rx, session.request_timeout).await? {
        ViewEvent::Bulk(outcomes) => {
            let reports: Vec<LeafReport> = args
                .entities
                .iter()
                .zip(outcomes)
                .map(|(name, outcome)| LeafReport::new(name.clone(), outcome))
                .collect();
            let out = match global.format() {
                OutputFormat::Table | OutputFormat::Plain => {
                    render_reports(global, &reports)?
                }
                format => {
                    let positional: Vec<&Value> = reports.iter().map(|r| &r.outcome).collect();
                    output::render_single(
                        &format,
                        &positional,
                        |_| String::new(),
                        |_| String::new(),
                    )?
                }
            };
            output::print_output(&out, global.quiet);
            check_failures(&reports)
        }
        ViewEvent::Error(err) => Err(CliError::from_delivered(
            err,
            "bulk",
            &args.entities.join(","),
        )),
        ViewEvent::Data(_) | ViewEvent::Batch(_) => Err(CliError::RequestFailed {
            message: "unexpected delivery for bulk request".into(),
        }),
    }
}

// ── Leaf reporting ──────────────────────────────────────────────────

/// One batch identifier or bulk position, flattened for display.
#[derive(Serialize)]
struct LeafReport {
    key: String,
    ok: bool,
    /// `{"success": data}` or `{"error": {message, statusCode}}`.
    outcome: Value,
}

impl LeafReport {
    fn new(key: String, outcome: LeafOutcome) -> Self {
        let (ok, outcome) = match outcome {
            LeafOutcome::Success(payload) => (true, json!({ "success": payload.into_value() })),
            LeafOutcome::Error(err) => (false, json!({ "error": err })),
        };
        Self { key, ok, outcome }
    }

    fn detail(&self) -> String {
        self.outcome
            .get("success")
            .or_else(|| self.outcome.get("error").and_then(|e| e.get("message")))
            .map(output::cell)
            .unwrap_or_default()
    }
}

#[derive(Tabled)]
struct LeafRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&LeafReport> for LeafRow {
    fn from(r: &LeafReport) -> Self {
        let status = r
            .outcome
            .pointer("/error/statusCode")
            .map(output::cell)
            .unwrap_or_default();
        Self {
            key: r.key.clone(),
            result: if r.ok { "ok" } else { "error" }.into(),
            status,
            detail: r.detail(),
        }
    }
}

fn render_reports(global: &GlobalOpts, reports: &[LeafReport]) -> Result<String, CliError> {
    output::render_list(&global.format(), reports, |r| LeafRow::from(r), |r| {
        format!("{}\t{}", r.key, if r.ok { "ok" } else { "error" })
    })
}

fn check_failures(reports: &[LeafReport]) -> Result<(), CliError> {
    let failed = reports.iter().filter(|r| !r.ok).count();
    if failed == 0 {
        return Ok(());
    }
    Err(CliError::PartialFailure {
        failed,
        total: reports.len(),
    })
}

//! Command dispatch: bridges CLI args -> dispatcher requests -> output formatting.

pub mod cache;
pub mod config_cmd;
pub mod entities;
pub mod fetch;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::{Config, Session};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    session: &Session,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Get(args) => fetch::get(args, session, cfg, global).await,
        Command::Send(args) => fetch::send(args, session, cfg, global).await,
        Command::Batch(args) => fetch::batch(args, session, cfg, global).await,
        Command::Bulk(args) => fetch::bulk(args, session, cfg, global).await,
        // Handled in `run` before a session exists
        Command::Entities | Command::Cache(_) | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::RequestFailed {
                message: "command does not need a backend session".into(),
            })
        }
    }
}

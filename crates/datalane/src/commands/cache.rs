//! `cache` handlers: inspect and prune the persisted response cache.

use chrono::DateTime;
use tabled::Tabled;

use datalane_core::{CacheRecord, Clock, SystemClock};

use crate::cli::{CacheArgs, CacheCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct CacheRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Expires")]
    expires: String,
    #[tabled(rename = "Page")]
    page: String,
    #[tabled(rename = "State")]
    state: String,
}

fn to_row(record: &CacheRecord, now_ms: i64) -> CacheRow {
    let expires = DateTime::from_timestamp_millis(record.meta.expires).map_or_else(
        || record.meta.expires.to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    CacheRow {
        key: record.url.clone(),
        source: record.meta.url.clone(),
        expires,
        page: record.meta.page_name.clone().unwrap_or_else(|| "*".into()),
        state: if record.is_expired(now_ms) {
            "expired"
        } else {
            "fresh"
        }
        .into(),
    }
}

pub async fn handle(args: CacheArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let cache = config::open_cache(global, cfg)?;

    match args.command {
        CacheCommand::List => {
            let records = cache.records().await?;
            let now_ms = SystemClock.now_ms();
            let out = output::render_list(
                &global.format(),
                &records,
                |r| to_row(r, now_ms),
                |r| r.url.clone(),
            )?;
            output::print_output(&out, global.quiet);
        }
        CacheCommand::Remove { key } => {
            let known = cache.records().await?.iter().any(|r| r.url == key);
            if !known {
                return Err(CliError::NotFound {
                    resource_type: "cache entry".into(),
                    identifier: key,
                    list_command: "cache list".into(),
                });
            }
            cache.remove(&key).await?;
            if !global.quiet {
                eprintln!("Removed {key}");
            }
        }
        CacheCommand::Sweep => {
            let removed = cache.sweep().await?;
            if !global.quiet {
                eprintln!("Removed {removed} stale entr{}", if removed == 1 { "y" } else { "ies" });
            }
        }
        CacheCommand::Clear => {
            cache.clear().await?;
            if !global.quiet {
                eprintln!("Cache cleared");
            }
        }
    }
    Ok(())
}

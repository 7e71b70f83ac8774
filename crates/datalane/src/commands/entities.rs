//! `entities` handler: lists entity definitions from the config file.

use serde::Serialize;
use tabled::Tabled;

use datalane_config::EntityDefinition;

use crate::cli::GlobalOpts;
use crate::config::Config;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct EntitySummary<'a> {
    name: &'a str,
    #[serde(flatten)]
    definition: &'a EntityDefinition,
}

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Default")]
    default_operation: String,
    #[tabled(rename = "Also Allowed")]
    allowed: String,
    #[tabled(rename = "Reuse")]
    reuse: String,
    #[tabled(rename = "Class")]
    blob_class: String,
}

impl From<&EntitySummary<'_>> for EntityRow {
    fn from(s: &EntitySummary<'_>) -> Self {
        let d = s.definition;
        let source = match (&d.url, &d.batch) {
            (Some(url), _) => url.clone(),
            (None, Some(calls)) => {
                let ids: Vec<&str> = calls.iter().map(|c| c.identifier.as_str()).collect();
                format!("batch [{}]", ids.join(", "))
            }
            (None, None) => "-".into(),
        };
        let reuse = match d.reuse {
            Some(ref policy) if !policy.enable => "off".into(),
            Some(ref policy) => format!("{}ms {}", policy.timeout_ms, policy.scope),
            None => "default".into(),
        };
        Self {
            name: s.name.to_owned(),
            source,
            default_operation: d
                .default_operation
                .map_or_else(|| "get".into(), |op| op.to_string()),
            allowed: d
                .allowed_operations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            reuse,
            blob_class: d.blob_class.clone().unwrap_or_default(),
        }
    }
}

pub fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let summaries: Vec<EntitySummary<'_>> = cfg
        .entities
        .iter()
        .map(|(name, definition)| EntitySummary { name, definition })
        .collect();

    let out = output::render_list(&global.format(), &summaries, |s| EntityRow::from(s), |s| {
        s.name.to_owned()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

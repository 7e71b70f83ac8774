//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Typed listings use
//! the `Tabled` derive; arbitrary backend JSON goes through
//! [`render_value`], which builds its columns from the data.

use std::io::{self, Write};

use serde_json::Value;
use tabled::{Table, Tabled, builder::Builder, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one line per item
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Render a backend response whose shape is only known at runtime.
///
/// Arrays of objects become one row per element with the union of their
/// keys as columns; a single object becomes a field/value table.
pub fn render_value(format: &OutputFormat, value: &Value) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => Ok(value_table(value)),
        OutputFormat::Json => render_json(value, false),
        OutputFormat::JsonCompact => render_json(value, true),
        OutputFormat::Yaml => render_yaml(value),
        OutputFormat::Plain => Ok(plain_lines(value)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Cell text for a JSON value: strings verbatim, null empty, the rest
/// as compact JSON.
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    Ok(rendered?)
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_yaml::to_string(data).map_err(|e| CliError::Render(e.to_string()))
}

fn value_table(value: &Value) -> String {
    match value {
        Value::Array(items) if items.iter().all(Value::is_object) && !items.is_empty() => {
            let mut columns: Vec<&str> = Vec::new();
            for item in items.iter().filter_map(Value::as_object) {
                for key in item.keys() {
                    if !columns.contains(&key.as_str()) {
                        columns.push(key);
                    }
                }
            }
            let mut builder = Builder::default();
            builder.push_record(columns.iter().map(|col| (*col).to_owned()));
            for item in items.iter().filter_map(Value::as_object) {
                builder.push_record(
                    columns
                        .iter()
                        .map(|col| item.get(*col).map(cell).unwrap_or_default()),
                );
            }
            builder.build().with(Style::rounded()).to_string()
        }
        Value::Array(items) => {
            let mut builder = Builder::default();
            builder.push_record(header(&["#", "Value"]));
            for (idx, item) in items.iter().enumerate() {
                builder.push_record([idx.to_string(), cell(item)]);
            }
            builder.build().with(Style::rounded()).to_string()
        }
        Value::Object(map) => {
            let mut builder = Builder::default();
            builder.push_record(header(&["Field", "Value"]));
            for (key, val) in map {
                builder.push_record([key.clone(), cell(val)]);
            }
            builder.build().with(Style::rounded()).to_string()
        }
        scalar => cell(scalar),
    }
}

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

fn plain_lines(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join("\n"),
        other => cell(other),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn table_columns_are_the_union_of_keys() {
        let rendered = value_table(&json!([
            { "id": 1, "name": "ada" },
            { "id": 2, "role": "admin" }
        ]));
        let header = rendered.lines().nth(1).unwrap_or_default();
        assert!(header.contains("id"));
        assert!(header.contains("name"));
        assert!(header.contains("role"));
        assert!(rendered.contains("admin"));
    }

    #[test]
    fn objects_render_as_field_value_pairs() {
        let rendered = value_table(&json!({ "id": 7, "tags": ["a", "b"] }));
        assert!(rendered.contains("Field"));
        assert!(rendered.contains(r#"["a","b"]"#));
    }

    #[test]
    fn plain_prints_one_line_per_element() {
        assert_eq!(plain_lines(&json!(["a", 2, null])), "a\n2\n");
        assert_eq!(plain_lines(&json!("solo")), "solo");
    }
}

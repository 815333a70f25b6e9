pub mod config;
pub mod init;
pub mod migrate;
pub mod plan;
pub mod status;
pub mod unlock;

use anyhow::{anyhow, Result};
use schemactl::catalog::CalendarStoreCatalog;
use schemactl::database::{ensure_parent_dir, DatabaseConn};
use schemactl::utils::OutputFormat;
use schemactl::{SchemactlConfig, StepRegistry};
use serde::Serialize;
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Open the configured database, which must already exist
pub(crate) fn open_existing(config: &SchemactlConfig) -> Result<DatabaseConn> {
    let path = config.database_path.as_str();
    if !Path::new(path).exists() {
        return Err(anyhow!(
            "Database '{}' does not exist; run `schemactl init` first",
            path
        ));
    }
    DatabaseConn::open(Some(path), config.busy_timeout())
}

/// Open the configured database, creating the file and its directory if needed
pub(crate) fn open_or_create(config: &SchemactlConfig) -> Result<DatabaseConn> {
    let path = config.database_path.as_str();
    ensure_parent_dir(path)?;
    DatabaseConn::open(Some(path), config.busy_timeout())
}

/// Registry of every step the binary knows about, built for the configured
/// version marker
pub(crate) fn known_steps(config: &SchemactlConfig) -> Result<StepRegistry> {
    let catalog = CalendarStoreCatalog::for_marker(config.version_marker());
    Ok(StepRegistry::from_source(&catalog)?)
}

/// Print a list of rows in any output format
///
/// `psv` writes `header` followed by one line per row from `to_psv`.
pub(crate) fn print_rows<T, F>(rows: &[T], format: OutputFormat, header: &str, to_psv: F) -> Result<()>
where
    T: Serialize + Tabled,
    F: Fn(&T) -> String,
{
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows).with(Style::rounded())),
        OutputFormat::Markdown => println!("{}", Table::new(rows).with(Style::markdown())),
        OutputFormat::Psv => {
            println!("{}", header);
            for row in rows {
                println!("{}", to_psv(row));
            }
        }
        _ => {
            if let Some(json) = format.json_records(rows) {
                println!("{}", json?);
            }
        }
    }
    Ok(())
}

/// Print a single serializable value as JSON when a JSON format is selected
///
/// Returns `false` for non-JSON formats, leaving the caller to render text.
pub(crate) fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format.json_value(value) {
        Some(json) => {
            println!("{}", json?);
            Ok(true)
        }
        None => Ok(false),
    }
}

use anyhow::Result;
use clap::Args;
use schemactl::utils::OutputFormat;
use schemactl::{SchemaManager, SchemaVersion, SchemactlConfig};
use serde_json::json;

use super::{open_or_create, print_json};

/// Arguments for the Init command
#[derive(Args)]
pub struct InitArgs {
    /// Schema version the database is currently at
    #[clap(long = "version", value_name = "VERSION")]
    pub schema_version: u32,

    /// Overwrite an existing version marker
    #[clap(long)]
    pub force: bool,
}

pub fn run(config: &SchemactlConfig, args: InitArgs, output_format: OutputFormat) -> Result<()> {
    let InitArgs {
        schema_version,
        force,
    } = args;
    let version = SchemaVersion::new(schema_version);

    let db = open_or_create(config)?;
    let marker = config.version_marker();
    SchemaManager::new(&db.conn, &marker).initialize(version, force)?;

    let output = json!({
        "database": config.database_path,
        "version_marker": format!("{}.{}", marker.table, marker.key),
        "version": version,
    });
    if !print_json(&output, output_format)? {
        println!(
            "Initialized {} at schema version {}",
            config.database_path, version
        );
    }
    Ok(())
}

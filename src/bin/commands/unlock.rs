use anyhow::Result;
use clap::Args;
use schemactl::utils::OutputFormat;
use schemactl::{MigrationLock, SchemactlConfig};
use serde_json::json;

use super::{open_existing, print_json};

/// Arguments for the Unlock command
#[derive(Args)]
pub struct UnlockArgs {}

pub fn run(config: &SchemactlConfig, _args: UnlockArgs, output_format: OutputFormat) -> Result<()> {
    let db = open_existing(config)?;

    let holder = MigrationLock::holder(&db.conn)?;
    let removed = MigrationLock::force_release(&db.conn)?;

    let output = json!({
        "removed": removed,
        "owner": holder.as_ref().map(|h| h.owner.as_str()),
    });
    if print_json(&output, output_format)? {
        return Ok(());
    }

    match holder {
        Some(h) if removed => println!("Removed migration lock held by {}", h.owner),
        _ => println!("No migration lock is held"),
    }
    Ok(())
}

use anyhow::Result;
use chrono::Utc;
use chrono_humanize::HumanTime;
use clap::Args;
use schemactl::migrate::LockHolder;
use schemactl::utils::OutputFormat;
use schemactl::{MigrationLock, MigrationPlanner, SchemaManager, SchemaStatus, SchemaVersion, SchemactlConfig};
use serde::Serialize;

use super::{known_steps, open_existing, print_json};

/// Arguments for the Status command
#[derive(Args)]
pub struct StatusArgs {
    /// List the pending steps
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct StatusInfo {
    database: String,
    version_marker: String,
    #[serde(flatten)]
    status: SchemaStatus,
    latest_known: Option<SchemaVersion>,
    pending_steps: Vec<String>,
    lock: Option<LockHolder>,
}

pub fn run(config: &SchemactlConfig, args: StatusArgs, output_format: OutputFormat) -> Result<()> {
    let StatusArgs { verbose } = args;

    let db = open_existing(config)?;
    let registry = known_steps(config)?;
    let marker = config.version_marker();

    let latest_known = registry.latest_version();
    let status = SchemaManager::new(&db.conn, &marker).check_status(latest_known)?;

    let pending_steps = match &status {
        SchemaStatus::NeedsMigration { from, to } => MigrationPlanner::new(&registry)?
            .plan(*from, *to)?
            .steps
            .iter()
            .map(|s| format!("{}: {}", s, s.description()))
            .collect(),
        _ => Vec::new(),
    };

    let info = StatusInfo {
        database: config.database_path.clone(),
        version_marker: format!("{}.{}", marker.table, marker.key),
        status,
        latest_known,
        pending_steps,
        lock: MigrationLock::holder(&db.conn)?,
    };

    if print_json(&info, output_format)? {
        return Ok(());
    }

    let current = info
        .status
        .version()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "not initialized".to_string());
    let latest = info
        .latest_known
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    let state = match &info.status {
        SchemaStatus::NotInitialized => "not initialized".to_string(),
        SchemaStatus::Current { .. } => "up to date".to_string(),
        SchemaStatus::NeedsMigration { .. } => {
            format!("{} step(s) pending", info.pending_steps.len())
        }
        SchemaStatus::Incompatible { .. } => "newer than any known step".to_string(),
    };
    let lock = match &info.lock {
        Some(holder) => format!(
            "held by {} since {} ({})",
            holder.owner,
            holder.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"),
            HumanTime::from(holder.acquired_at - Utc::now())
        ),
        None => "free".to_string(),
    };

    if output_format == OutputFormat::Psv {
        println!("database|current|latest|state|lock");
        println!(
            "{}|{}|{}|{}|{}",
            info.database, current, latest, state, lock
        );
        return Ok(());
    }

    println!("Database:        {}", info.database);
    println!("Version Marker:  {}", info.version_marker);
    println!("Current Version: {}", current);
    println!("Latest Known:    {}", latest);
    println!("State:           {}", state);
    println!("Migration Lock:  {}", lock);

    if verbose && !info.pending_steps.is_empty() {
        println!();
        println!("Pending steps:");
        for step in &info.pending_steps {
            println!("  {}", step);
        }
    }
    Ok(())
}

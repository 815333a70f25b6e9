use anyhow::Result;
use clap::Args;
use schemactl::utils::OutputFormat;
use schemactl::{SchemactlConfig, StepRegistry};
use serde::Serialize;
use std::path::Path;

use super::{known_steps, print_json};

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also list the known upgrade steps
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo<'a> {
    config_file: String,
    #[serde(flatten)]
    settings: &'a SchemactlConfig,
    database_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    known_steps: Option<Vec<String>>,
}

pub fn run(config: &SchemactlConfig, args: ConfigArgs, output_format: OutputFormat) -> Result<()> {
    let ConfigArgs { verbose } = args;

    let db_path = Path::new(&config.database_path);
    let database_exists = db_path.exists();
    let database_size_bytes = if database_exists {
        std::fs::metadata(db_path).ok().map(|m| m.len())
    } else {
        None
    };

    let known_steps = if verbose {
        Some(list_steps(&known_steps(config)?))
    } else {
        None
    };

    let info = ConfigInfo {
        config_file: SchemactlConfig::config_file_path(),
        settings: config,
        database_exists,
        database_size_bytes,
        known_steps,
    };

    if print_json(&info, output_format)? {
        return Ok(());
    }

    // Table, Markdown, and PSV all use the same human-readable format
    print_config(&info);
    Ok(())
}

fn list_steps(registry: &StepRegistry) -> Vec<String> {
    registry
        .steps()
        .map(|s| format!("{}: {}", s, s.description()))
        .collect()
}

fn print_config(info: &ConfigInfo<'_>) {
    println!("schemactl Configuration");
    println!("=======================\n");
    println!("{}", info.settings.summary());
    println!(
        "Database Status:    {}",
        match (info.database_exists, info.database_size_bytes) {
            (true, Some(size)) => format!("exists ({})", format_size(size)),
            (true, None) => "exists".to_string(),
            (false, _) => "not created".to_string(),
        }
    );

    if let Some(steps) = &info.known_steps {
        println!();
        println!("Known Upgrade Steps:");
        for step in steps {
            println!("  {}", step);
        }
    }

    eprintln!();
    eprintln!("Tips:");
    eprintln!("  Use --verbose (-v) to list the known upgrade steps");
    eprintln!("  Use --format json for machine-readable output");
    eprintln!("  Edit ~/.schemactl/schemactl.toml or set SCHEMACTL_* variables to customize settings");
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::{Parser, Subcommand};
use schemactl::utils::OutputFormat;
use schemactl::{MigrationError, SchemactlConfig};
use tracing::Level;

mod commands;

use commands::config::ConfigArgs;
use commands::init::InitArgs;
use commands::migrate::MigrateArgs;
use commands::plan::PlanArgs;
use commands::status::StatusArgs;
use commands::unlock::UnlockArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.schemactl/schemactl.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Database file to operate on, overriding the configured path
    #[clap(short, long, global = true)]
    database: Option<String>,

    /// Print debug information
    #[clap(long, global = true)]
    debug: bool,

    /// Output format: table (default), markdown, json, json-pretty, json-line, psv
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending upgrade steps up to a target version
    Migrate(MigrateArgs),

    /// Show the steps a migration would apply, without changing anything
    Plan(PlanArgs),

    /// Show the current schema version, pending steps and lock holder
    Status(StatusArgs),

    /// Create the control tables and record an initial schema version
    Init(InitArgs),

    /// Remove a migration lock left behind by a killed process
    Unlock(UnlockArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = match SchemactlConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    let result = match cli.command {
        Commands::Migrate(args) => commands::migrate::run(&config, args, cli.format),
        Commands::Plan(args) => commands::plan::run(&config, args, cli.format),
        Commands::Status(args) => commands::status::run(&config, args, cli.format),
        Commands::Init(args) => commands::init::run(&config, args, cli.format),
        Commands::Unlock(args) => commands::unlock::run(&config, args, cli.format),
        Commands::Config(args) => commands::config::run(&config, args, cli.format),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Map an error to the process exit code of its failure kind
fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<MigrationError>()
        .map(MigrationError::exit_code)
        .unwrap_or(1)
}

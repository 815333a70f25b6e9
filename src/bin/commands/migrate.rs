use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use schemactl::migrate::{MigrationReport, RunState};
use schemactl::utils::{format_millis, truncate_description, OutputFormat, DEFAULT_DESCRIPTION_MAX_LEN};
use schemactl::{MigrationExecutor, SchemaVersion, SchemactlConfig};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

use super::{known_steps, open_existing, print_json, print_rows};

/// Arguments for the Migrate command
#[derive(Args)]
pub struct MigrateArgs {
    /// Version to migrate to, defaults to the latest known version
    #[clap(short, long)]
    pub target: Option<u32>,

    /// How long to wait for another migration to finish, e.g. "30s" or "2m"
    #[clap(long)]
    pub lock_timeout: Option<humantime::Duration>,

    /// Do not show the progress bar
    #[clap(long)]
    pub no_progress: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct AppliedRow {
    step: String,
    description: String,
    operations: usize,
    duration: String,
}

pub fn run(config: &SchemactlConfig, args: MigrateArgs, output_format: OutputFormat) -> Result<()> {
    let MigrateArgs {
        target,
        lock_timeout,
        no_progress,
    } = args;

    let db = open_existing(config)?;
    let registry = known_steps(config)?;

    let mut lock_options = config.lock_options();
    if let Some(timeout) = lock_timeout {
        lock_options.timeout = timeout.into();
    }

    let executor = MigrationExecutor::new(&db.conn, &registry)?
        .with_marker(config.version_marker())
        .with_lock_options(lock_options);

    let target = match target {
        Some(v) => SchemaVersion::new(v),
        None => match registry.latest_version() {
            Some(latest) => latest,
            None => executor.current_version()?,
        },
    };

    // Step count for the bar; the locked run re-plans from the stored version
    let pending = executor.pending(target)?.len();

    let executor = if no_progress || output_format.is_json() || pending == 0 {
        executor
    } else {
        executor.on_state(progress_callback(pending))
    };

    let report = executor.migrate(target)?;
    format_output(&report, output_format)
}

fn progress_callback(total_steps: usize) -> Arc<dyn Fn(&RunState) + Send + Sync> {
    let pb = ProgressBar::new(total_steps as u64);
    if let Ok(sty) = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}/{len:3} {msg}",
    ) {
        pb.set_style(sty.progress_chars("##-"));
    }

    Arc::new(move |state: &RunState| match state {
        RunState::LockAcquired => pb.set_message("lock acquired"),
        RunState::Applying { index, from, to } => {
            pb.set_position(*index as u64);
            pb.set_message(format!("applying {} -> {}", from, to));
        }
        RunState::VersionAdvancing { to, .. } => {
            pb.set_message(format!("recording version {}", to));
        }
        RunState::Complete => pb.finish_with_message("done"),
        RunState::Aborted => pb.abandon_with_message("aborted"),
        RunState::Idle | RunState::Planning => {}
    })
}

fn format_output(report: &MigrationReport, output_format: OutputFormat) -> Result<()> {
    if print_json(report, output_format)? {
        return Ok(());
    }

    if report.is_noop() {
        println!("Database already at version {}", report.end_version);
        return Ok(());
    }

    let rows: Vec<AppliedRow> = report
        .applied
        .iter()
        .map(|s| AppliedRow {
            step: format!("{} -> {}", s.from, s.to),
            description: if output_format.is_table() {
                truncate_description(&s.description, DEFAULT_DESCRIPTION_MAX_LEN)
            } else {
                s.description.clone()
            },
            operations: s.operations,
            duration: format_millis(s.duration_ms),
        })
        .collect();

    print_rows(&rows, output_format, "step|description|operations|duration", |r| {
        format!("{}|{}|{}|{}", r.step, r.description, r.operations, r.duration)
    })?;

    println!(
        "Migrated from version {} to {}: {} step(s), {} operation(s) in {}",
        report.start_version,
        report.end_version,
        report.applied.len(),
        report.statements_executed(),
        format_millis(report.duration_ms)
    );
    Ok(())
}

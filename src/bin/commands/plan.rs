use anyhow::{anyhow, Result};
use clap::Args;
use schemactl::migrate::MigrationPlan;
use schemactl::utils::{truncate_description, OutputFormat, DEFAULT_DESCRIPTION_MAX_LEN};
use schemactl::{
    Dialect, MigrationPlanner, SchemaVersion, SchemactlConfig, StatementRunner, VersionStore,
};
use serde::Serialize;
use tabled::Tabled;

use super::{known_steps, open_existing, print_json, print_rows};

/// Arguments for the Plan command
#[derive(Args)]
pub struct PlanArgs {
    /// Version to plan to, defaults to the latest known version
    #[clap(short, long)]
    pub target: Option<u32>,

    /// Plan from this version instead of the one stored in the database
    #[clap(long)]
    pub from: Option<u32>,

    /// Print the SQL statements each step would run
    #[clap(long)]
    pub sql: bool,

    /// SQL dialect for --sql output: sqlite, postgres, oracle
    #[clap(long)]
    pub dialect: Option<Dialect>,
}

#[derive(Debug, Serialize, Tabled)]
struct PlanRow {
    step: String,
    description: String,
    operations: usize,
}

#[derive(Debug, Serialize)]
struct StepSql {
    from: SchemaVersion,
    to: SchemaVersion,
    description: String,
    statements: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PlanOutput<'a> {
    #[serde(flatten)]
    plan: &'a MigrationPlan<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dialect: Option<Dialect>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sql: Vec<StepSql>,
}

pub fn run(config: &SchemactlConfig, args: PlanArgs, output_format: OutputFormat) -> Result<()> {
    let PlanArgs {
        target,
        from,
        sql,
        dialect,
    } = args;

    let registry = known_steps(config)?;
    let planner = MigrationPlanner::new(&registry)?;

    let current = match from {
        Some(v) => SchemaVersion::new(v),
        None => {
            let db = open_existing(config)?;
            let marker = config.version_marker();
            VersionStore::new(&db.conn, &marker).read()?
        }
    };

    let target = match target {
        Some(v) => SchemaVersion::new(v),
        None => registry
            .latest_version()
            .ok_or_else(|| anyhow!("No upgrade steps are known"))?,
    };

    let plan = planner.plan(current, target)?;
    let dialect = dialect.unwrap_or(config.dialect);

    let rendered: Vec<StepSql> = if sql {
        let runner = StatementRunner::new(dialect);
        plan.steps
            .iter()
            .map(|step| StepSql {
                from: step.from_version(),
                to: step.to_version(),
                description: step.description().to_string(),
                statements: runner.render(step.operations()),
            })
            .collect()
    } else {
        Vec::new()
    };

    let output = PlanOutput {
        plan: &plan,
        dialect: sql.then_some(dialect),
        sql: rendered,
    };
    if print_json(&output, output_format)? {
        return Ok(());
    }

    if plan.is_empty() {
        println!("Nothing to do: database is at version {}", current);
        return Ok(());
    }

    if sql {
        for step in &output.sql {
            println!("-- {} -> {}: {}", step.from, step.to, step.description);
            for statement in &step.statements {
                println!("{};", statement.trim_end_matches(';'));
            }
            println!();
        }
        return Ok(());
    }

    let rows: Vec<PlanRow> = plan
        .steps
        .iter()
        .map(|step| PlanRow {
            step: step.to_string(),
            description: if output_format.is_table() {
                truncate_description(step.description(), DEFAULT_DESCRIPTION_MAX_LEN)
            } else {
                step.description().to_string()
            },
            operations: step.operations().len(),
        })
        .collect();

    print_rows(&rows, output_format, "step|description|operations", |r| {
        format!("{}|{}|{}", r.step, r.description, r.operations)
    })?;
    println!(
        "{} step(s), {} operation(s) from version {} to {}",
        plan.len(),
        plan.operation_count(),
        plan.current,
        plan.target
    );
    Ok(())
}

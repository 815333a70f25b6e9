#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! schemactl - Versioned schema migrations for SQL stores
//!
//! schemactl brings a database from its recorded schema version to a target
//! version by applying an ordered chain of upgrade steps. Every step runs in
//! its own transaction together with the version marker update, and a
//! cross-process lock keeps concurrent runs from applying a step twice. It
//! can be used as both a command-line application and a library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (none) | Migration engine, control tables, configuration | `rusqlite`, `config` |
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | The `schemactl` binary | All above + `clap`, `indicatif` |
//!
//! ```toml
//! # Engine only
//! schemactl = { version = "0.1", default-features = false }
//!
//! # Default (CLI binary)
//! schemactl = "0.1"
//! ```
//!
//! # Architecture
//!
//! - **[`migrate`]**: The migration engine
//!   - `VersionStore`: read/write of the persisted version marker
//!   - `StepRegistry`: the contiguous chain of known upgrade steps
//!   - `MigrationPlanner`: the step sequence from one version to another
//!   - `StatementRunner`: dialect rendering and transactional execution
//!   - `MigrationLock`: cross-process mutual exclusion
//!   - `MigrationExecutor`: the run state machine
//! - **[`catalog`]**: Built-in upgrade sources
//! - **[`database`]**: SQLite connection setup and control table bootstrap
//! - **[`config`]**: Configuration management
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use schemactl::catalog::CalendarStoreCatalog;
//! use schemactl::database::DatabaseConn;
//! use schemactl::migrate::{MigrationExecutor, SchemaVersion, StepRegistry};
//!
//! let db = DatabaseConn::open_path("/var/db/calendar.sqlite3")?;
//! let registry = StepRegistry::from_source(&CalendarStoreCatalog::new())?;
//!
//! let executor = MigrationExecutor::new(&db.conn, &registry)?;
//! let plan = executor.pending(SchemaVersion::new(29))?;
//! println!("{} step(s) pending", plan.len());
//!
//! let report = executor.migrate(SchemaVersion::new(29))?;
//! println!("{} -> {}", report.start_version, report.end_version);
//! ```
//!
//! ## Progress Reporting
//!
//! ```rust,ignore
//! use schemactl::migrate::{MigrationExecutor, RunState};
//! use std::sync::Arc;
//!
//! let executor = MigrationExecutor::new(&db.conn, &registry)?.on_state(Arc::new(
//!     |state: &RunState| {
//!         if let RunState::Applying { from, to, .. } = state {
//!             println!("applying {} -> {}", from, to);
//!         }
//!     },
//! ));
//! executor.migrate_to_latest()?;
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod migrate;
pub mod utils;

pub use config::SchemactlConfig;

pub use database::{DatabaseConn, SchemaManager, SchemaStatus};

pub use migrate::{
    Dialect, MigrationError, MigrationExecutor, MigrationPlan, MigrationPlanner, MigrationLock,
    MigrationReport, RunState, SchemaVersion, StatementRunner, StepRegistry, UpgradeSource,
    UpgradeStep, VersionMarker, VersionStore,
};

pub use catalog::CalendarStoreCatalog;

pub use utils::OutputFormat;

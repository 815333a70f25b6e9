//! Versioned schema migration engine
//!
//! - **version**: `SchemaVersion` and immutable `UpgradeStep` descriptors
//! - **operation**: dialect-neutral operation shapes carried by steps
//! - **dialect**: SQL rendering of operations for sqlite, postgres and oracle
//! - **version_store**: the persisted version marker row
//! - **registry**: `StepRegistry`, validated as one contiguous chain
//! - **planner**: `MigrationPlanner`, computing the step chain to a target
//! - **runner**: `StatementRunner`, executing a step's operations in a transaction
//! - **lock**: cross-process `MigrationLock` backed by a single-row table
//! - **executor**: `MigrationExecutor`, the only component that mutates the schema
//!
//! # Usage
//!
//! ```rust,ignore
//! use schemactl::migrate::{MigrationExecutor, SchemaVersion, StepRegistry};
//! use schemactl::catalog::CalendarStoreCatalog;
//!
//! let registry = StepRegistry::from_source(&CalendarStoreCatalog::new())?;
//! let executor = MigrationExecutor::new(&conn, &registry)?;
//! let report = executor.migrate(SchemaVersion(29))?;
//! println!("now at version {}", report.end_version);
//! ```

mod dialect;
mod error;
mod executor;
mod lock;
mod operation;
mod planner;
mod registry;
mod runner;
mod version;
mod version_store;

pub use dialect::{quote_literal, Dialect};
pub use error::{MigrationError, StatementError, StepFailure};
pub use executor::{AppliedStep, MigrationExecutor, MigrationReport, RunState, RunStateCallback};
pub use lock::{
    default_owner, LockHolder, LockOptions, MigrationLock, DEFAULT_LOCK_POLL_INTERVAL,
    DEFAULT_LOCK_TIMEOUT, LOCK_TABLE, LOCK_TABLE_SQL,
};
pub use operation::{
    AddColumn, ColumnType, CreateIndex, ForeignKey, OnDelete, Operation, UpsertSingleton,
};
pub use planner::{MigrationPlan, MigrationPlanner};
pub use registry::{StepRegistry, UpgradeSource};
pub use runner::StatementRunner;
pub use version::{SchemaVersion, UpgradeStep};
pub use version_store::{VersionMarker, VersionStore, DEFAULT_VERSION_KEY, DEFAULT_VERSION_TABLE};

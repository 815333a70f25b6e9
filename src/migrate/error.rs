//! Error types for the migration engine
//!
//! Registry and planning errors are raised before the database is touched.
//! Execution errors are raised after the in-flight transaction has been
//! rolled back, so the database is always at the last committed version.

use std::time::Duration;
use thiserror::Error;

use super::version::SchemaVersion;

/// A single operation of an upgrade step failed to execute
#[derive(Debug, Error)]
#[error("operation #{index} failed: {cause} (statement: {statement})")]
pub struct StatementError {
    /// Zero-based position of the failing operation within its step
    pub index: usize,
    /// The rendered statement text that was sent to the database
    pub statement: String,
    #[source]
    pub cause: rusqlite::Error,
}

/// The part of a step's transaction that failed
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] rusqlite::Error),

    #[error("failed to advance version marker: {0}")]
    VersionAdvance(#[source] rusqlite::Error),

    #[error("failed to commit: {0}")]
    Commit(#[source] rusqlite::Error),
}

impl StepFailure {
    /// Index of the failing operation, when the failure came from a statement
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            StepFailure::Statement(e) => Some(e.index),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("schema version marker not initialized (table {table}, key {key})")]
    NotInitialized { table: String, key: String },

    #[error("database already initialized at version {current}")]
    AlreadyInitialized { current: SchemaVersion },

    #[error("invalid schema version value '{value}'")]
    InvalidVersion { value: String },

    #[error("upgrade step {from} -> {to} must advance exactly one version")]
    NonIncrementalStep {
        from: SchemaVersion,
        to: SchemaVersion,
    },

    #[error("an upgrade step from version {from} is already registered")]
    DuplicateStep { from: SchemaVersion },

    #[error("upgrade steps are not contiguous: no step between version {after} and version {next}")]
    DiscontinuousChain {
        after: SchemaVersion,
        next: SchemaVersion,
    },

    #[error("target version {target} is behind current version {current}; downgrades are not supported")]
    TargetBehindCurrent {
        current: SchemaVersion,
        target: SchemaVersion,
    },

    #[error("no upgrade path reaches version {target} (chain ends at version {reached})")]
    UnknownTarget {
        target: SchemaVersion,
        reached: SchemaVersion,
    },

    #[error(
        "timed out after {waited:?} waiting for the migration lock{}; \
         if that run is gone, clear the lock with `schemactl unlock`",
        held_by(.holder)
    )]
    LockTimeout {
        waited: Duration,
        holder: Option<String>,
    },

    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error("upgrade step {from} -> {to} failed: {cause}")]
    MigrationFailed {
        from: SchemaVersion,
        to: SchemaVersion,
        #[source]
        cause: StepFailure,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

fn held_by(holder: &Option<String>) -> String {
    holder
        .as_ref()
        .map(|h| format!(" (held by {})", h))
        .unwrap_or_default()
}

impl MigrationError {
    /// Process exit code distinguishing each failure kind
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationError::LockTimeout { .. } => 3,
            MigrationError::DiscontinuousChain { .. } => 4,
            MigrationError::TargetBehindCurrent { .. } => 5,
            MigrationError::UnknownTarget { .. } => 6,
            MigrationError::MigrationFailed { .. } => 7,
            MigrationError::NotInitialized { .. } => 8,
            MigrationError::DuplicateStep { .. } | MigrationError::NonIncrementalStep { .. } => 9,
            MigrationError::AlreadyInitialized { .. }
            | MigrationError::InvalidVersion { .. }
            | MigrationError::Statement(_)
            | MigrationError::Database(_) => 1,
        }
    }

    /// Whether retrying the same call later may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigrationError::LockTimeout { .. })
    }
}

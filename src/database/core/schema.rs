//! Control table management
//!
//! This module bootstraps the tables the migration engine itself relies on:
//! the name/value table holding the version marker and the lock table. It
//! also classifies a database's version against the known upgrade chain.

use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::migrate::{MigrationError, SchemaVersion, VersionMarker, VersionStore, LOCK_TABLE_SQL};

/// Schema manager for the engine's control tables
pub struct SchemaManager<'a> {
    conn: &'a Connection,
    marker: &'a VersionMarker,
}

impl<'a> SchemaManager<'a> {
    /// Create a new schema manager for the given connection
    pub fn new(conn: &'a Connection, marker: &'a VersionMarker) -> Self {
        Self { conn, marker }
    }

    /// Create the control tables and seed the version marker
    ///
    /// Refuses to overwrite an existing marker unless `force` is set.
    pub fn initialize(&self, version: SchemaVersion, force: bool) -> Result<(), MigrationError> {
        let tx = self.conn.unchecked_transaction()?;
        let store = VersionStore::new(&tx, self.marker);

        if let Some(current) = store.try_read()? {
            if !force {
                return Err(MigrationError::AlreadyInitialized { current });
            }
            info!("Overwriting version marker {} with {}", current, version);
        }

        tx.execute_batch(&self.marker.create_table_sql())?;
        tx.execute_batch(LOCK_TABLE_SQL)?;
        store.write(version)?;
        tx.commit()?;

        info!(
            "Initialized version marker {}.{} at version {}",
            self.marker.table, self.marker.key, version
        );
        Ok(())
    }

    /// Classify the stored version against the latest known version
    pub fn check_status(&self, latest: Option<SchemaVersion>) -> Result<SchemaStatus, MigrationError> {
        let current = match VersionStore::new(self.conn, self.marker).try_read()? {
            Some(v) => v,
            None => return Ok(SchemaStatus::NotInitialized),
        };

        let status = match latest {
            Some(latest) if current < latest => SchemaStatus::NeedsMigration {
                from: current,
                to: latest,
            },
            Some(latest) if current > latest => SchemaStatus::Incompatible {
                database_version: current,
                known_version: latest,
            },
            _ => SchemaStatus::Current { version: current },
        };
        Ok(status)
    }
}

/// Status of the database schema relative to the upgrade chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SchemaStatus {
    /// No version marker (fresh or foreign database)
    NotInitialized,

    /// Database is at the latest known version
    Current { version: SchemaVersion },

    /// Database is behind the latest known version
    NeedsMigration {
        from: SchemaVersion,
        to: SchemaVersion,
    },

    /// Database is from a newer version than any known step produces
    Incompatible {
        database_version: SchemaVersion,
        known_version: SchemaVersion,
    },
}

impl SchemaStatus {
    pub fn version(&self) -> Option<SchemaVersion> {
        match self {
            SchemaStatus::NotInitialized => None,
            SchemaStatus::Current { version } => Some(*version),
            SchemaStatus::NeedsMigration { from, .. } => Some(*from),
            SchemaStatus::Incompatible {
                database_version, ..
            } => Some(*database_version),
        }
    }
}

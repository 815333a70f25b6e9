//! Persisted schema version marker
//!
//! The marker is one row of a name/value control table. Calendar store
//! databases keep it in `CALENDARSERVER` under `NAME = 'VERSION'`, with the
//! value stored as text.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::error::MigrationError;
use super::version::SchemaVersion;

pub const DEFAULT_VERSION_TABLE: &str = "CALENDARSERVER";
pub const DEFAULT_VERSION_KEY: &str = "VERSION";

/// Where the version marker lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMarker {
    pub table: String,
    pub key: String,
}

impl Default for VersionMarker {
    fn default() -> Self {
        Self {
            table: DEFAULT_VERSION_TABLE.to_string(),
            key: DEFAULT_VERSION_KEY.to_string(),
        }
    }
}

impl VersionMarker {
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }

    /// DDL for the control table holding the marker
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (NAME VARCHAR(255) PRIMARY KEY, VALUE VARCHAR(255))",
            self.table
        )
    }
}

/// Reads and writes the version marker through a borrowed connection
///
/// A `rusqlite::Transaction` dereferences to `Connection`, so the same store
/// type is used inside a step's transaction and outside of one.
pub struct VersionStore<'a> {
    conn: &'a Connection,
    marker: &'a VersionMarker,
}

impl<'a> VersionStore<'a> {
    pub fn new(conn: &'a Connection, marker: &'a VersionMarker) -> Self {
        Self { conn, marker }
    }

    fn not_initialized(&self) -> MigrationError {
        MigrationError::NotInitialized {
            table: self.marker.table.clone(),
            key: self.marker.key.clone(),
        }
    }

    fn table_exists(&self) -> Result<bool, MigrationError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [&self.marker.table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Read the current version
    ///
    /// Fails with `NotInitialized` when the control table or its version row
    /// does not exist.
    pub fn read(&self) -> Result<SchemaVersion, MigrationError> {
        self.try_read()?.ok_or_else(|| self.not_initialized())
    }

    /// Read the current version, `None` when the marker was never written
    pub fn try_read(&self) -> Result<Option<SchemaVersion>, MigrationError> {
        if !self.table_exists()? {
            return Ok(None);
        }

        let sql = format!("SELECT VALUE FROM {} WHERE NAME = ?1", self.marker.table);
        let value: Option<Option<String>> = self
            .conn
            .query_row(&sql, [&self.marker.key], |row| row.get(0))
            .optional()?;

        match value.flatten() {
            Some(v) => v.parse().map(Some),
            None => Ok(None),
        }
    }

    /// Replace the stored version
    ///
    /// Updates the existing row, inserting it when absent. Call this on the
    /// transaction of the step whose completion it records.
    pub fn write(&self, version: SchemaVersion) -> Result<(), rusqlite::Error> {
        let value = version.to_string();
        let update = format!("UPDATE {} SET VALUE = ?1 WHERE NAME = ?2", self.marker.table);
        let changed = self.conn.execute(&update, [&value, &self.marker.key])?;
        if changed == 0 {
            let insert = format!("INSERT INTO {} (NAME, VALUE) VALUES (?1, ?2)", self.marker.table);
            self.conn.execute(&insert, [&self.marker.key, &value])?;
        }
        Ok(())
    }
}

//! SQLite connections for migration runs
//!
//! Every connection schemactl opens gets the same pragmas: WAL so `status`
//! can read while a step holds the write lock, enforced foreign keys so
//! `ON DELETE` actions added by steps take effect, and a busy timeout so a
//! competing writer is waited on rather than failing immediately.

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::time::Duration;

/// Default time a statement waits on a locked database before failing
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pragmas applied to every connection, after the journal mode
const CONNECTION_PRAGMAS: &[(&str, &str)] = &[("synchronous", "NORMAL"), ("foreign_keys", "ON")];

/// An open, configured SQLite database
pub struct DatabaseConn {
    pub conn: Connection,
}

impl DatabaseConn {
    /// Open the database file at `path`, or a private in-memory database
    /// when `path` is `None`
    pub fn open(path: Option<&str>, busy_timeout: Duration) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p).with_context(|| format!("cannot open database '{}'", p))?,
            None => Connection::open_in_memory().context("cannot open in-memory database")?,
        };

        apply_settings(&conn, busy_timeout)?;
        Ok(DatabaseConn { conn })
    }

    pub fn open_path(path: &str) -> Result<Self> {
        Self::open(Some(path), DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(None, DEFAULT_BUSY_TIMEOUT)
    }

    /// Run a batch of `;`-separated statements
    pub fn execute(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| anyhow!("SQL batch failed: {}", e))
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        self.count_matching(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[table_name],
        )
    }

    pub fn index_exists(&self, index_name: &str) -> Result<bool> {
        self.count_matching(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
            &[index_name],
        )
    }

    /// Whether `table_name` has a column called `column_name`
    ///
    /// A missing table reports `false` rather than an error.
    pub fn column_exists(&self, table_name: &str, column_name: &str) -> Result<bool> {
        self.count_matching(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            &[table_name, column_name],
        )
    }

    fn count_matching(&self, sql: &str, params: &[&str]) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(sql, rusqlite::params_from_iter(params), |row| row.get(0))
            .with_context(|| format!("schema lookup failed: {}", sql))?;
        Ok(count > 0)
    }
}

fn apply_settings(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    // In-memory databases answer "memory" and stay that way
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("cannot set journal_mode")?;
    if !matches!(mode.as_str(), "wal" | "memory") {
        tracing::warn!("journal_mode is {} instead of wal", mode);
    }

    for (name, value) in CONNECTION_PRAGMAS {
        conn.pragma_update(None, name, value)
            .with_context(|| format!("cannot set {} = {}", name, value))?;
    }

    conn.busy_timeout(busy_timeout)
        .context("cannot set busy timeout")?;
    Ok(())
}

//! Cross-process migration lock
//!
//! The lock is a single-row mutex table inside the migrated database. Any
//! process that can open the database sees the same row, so two independent
//! `schemactl` processes can never run migrations at the same time.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::MigrationError;

pub const LOCK_TABLE: &str = "SCHEMACTL_LOCK";

/// SQL for creating the lock table; `ID = 1` keeps it to a single row
pub const LOCK_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS SCHEMACTL_LOCK (
        ID INTEGER PRIMARY KEY CHECK (ID = 1),
        OWNER TEXT NOT NULL,
        ACQUIRED_AT INTEGER NOT NULL
    );
"#;

/// Default bounded wait for the lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between acquisition attempts
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
        }
    }
}

/// The process currently holding the lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHolder {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

/// Generate an owner token unique to this process and run
pub fn default_owner() -> String {
    let run_id = Uuid::new_v4().simple().to_string();
    format!("schemactl-{}-{}", std::process::id(), &run_id[..8])
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

/// A held migration lock, released explicitly or on drop
pub struct MigrationLock<'c> {
    conn: &'c Connection,
    owner: String,
    released: bool,
}

impl<'c> MigrationLock<'c> {
    /// Acquire the lock, polling until `options.timeout` elapses
    pub fn acquire(
        conn: &'c Connection,
        owner: impl Into<String>,
        options: LockOptions,
    ) -> Result<Self, MigrationError> {
        let owner = owner.into();
        let started = Instant::now();

        loop {
            match Self::try_acquire(conn, &owner) {
                Ok(true) => {
                    info!("Acquired migration lock as {}", owner);
                    return Ok(Self {
                        conn,
                        owner,
                        released: false,
                    });
                }
                Ok(false) => {}
                Err(e) if is_busy(&e) => {
                    debug!("Database busy while acquiring migration lock, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            let waited = started.elapsed();
            if waited >= options.timeout {
                let holder = Self::holder(conn).ok().flatten().map(|h| h.owner);
                warn!(
                    "Gave up on migration lock after {:?} (holder: {:?})",
                    waited, holder
                );
                return Err(MigrationError::LockTimeout { waited, holder });
            }

            let remaining = options.timeout - waited;
            thread::sleep(options.poll_interval.min(remaining));
        }
    }

    fn try_acquire(conn: &Connection, owner: &str) -> Result<bool, rusqlite::Error> {
        conn.execute_batch(LOCK_TABLE_SQL)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO SCHEMACTL_LOCK (ID, OWNER, ACQUIRED_AT) VALUES (1, ?1, ?2)",
            rusqlite::params![owner, Utc::now().timestamp()],
        )?;
        Ok(inserted == 1)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Release the lock if this instance still owns it
    pub fn release(mut self) -> Result<(), MigrationError> {
        self.released = true;
        Self::delete_owned(self.conn, &self.owner)?;
        info!("Released migration lock held by {}", self.owner);
        Ok(())
    }

    fn delete_owned(conn: &Connection, owner: &str) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "DELETE FROM SCHEMACTL_LOCK WHERE ID = 1 AND OWNER = ?1",
            [owner],
        )
    }

    fn lock_table_exists(conn: &Connection) -> Result<bool, rusqlite::Error> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [LOCK_TABLE],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Who holds the lock right now, if anyone
    pub fn holder(conn: &Connection) -> Result<Option<LockHolder>, MigrationError> {
        if !Self::lock_table_exists(conn)? {
            return Ok(None);
        }

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT OWNER, ACQUIRED_AT FROM SCHEMACTL_LOCK WHERE ID = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(owner, ts)| LockHolder {
            owner,
            acquired_at: DateTime::from_timestamp(ts, 0).unwrap_or_default(),
        }))
    }

    /// Remove the lock regardless of owner
    ///
    /// Only for clearing a lock orphaned by a killed process. Returns whether
    /// a lock row was present.
    pub fn force_release(conn: &Connection) -> Result<bool, MigrationError> {
        if !Self::lock_table_exists(conn)? {
            return Ok(false);
        }
        let deleted = conn.execute("DELETE FROM SCHEMACTL_LOCK WHERE ID = 1", [])?;
        if deleted > 0 {
            warn!("Forcibly removed migration lock");
        }
        Ok(deleted > 0)
    }
}

impl Drop for MigrationLock<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = Self::delete_owned(self.conn, &self.owner) {
            warn!("Failed to release migration lock held by {}: {}", self.owner, e);
        }
    }
}

//! Database module
//!
//! ```text
//! database/
//! └── core/           # Foundation
//!     ├── connection  # SQLite DatabaseConn wrapper
//!     └── schema      # Control tables and version status
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use schemactl::database::{DatabaseConn, SchemaManager};
//! use schemactl::migrate::{SchemaVersion, VersionMarker};
//!
//! let db = DatabaseConn::open_path("/var/db/calendar.sqlite3")?;
//! let marker = VersionMarker::default();
//! SchemaManager::new(&db.conn, &marker).initialize(SchemaVersion(28), false)?;
//! ```

pub mod core;

pub use core::{DatabaseConn, SchemaManager, SchemaStatus, DEFAULT_BUSY_TIMEOUT};

/// Ensure the directory holding a database file exists
pub fn ensure_parent_dir(db_path: &str) -> anyhow::Result<()> {
    match std::path::Path::new(db_path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir).map_err(|e| {
            anyhow::anyhow!("Failed to create directory '{}': {}", dir.display(), e)
        }),
        _ => Ok(()),
    }
}

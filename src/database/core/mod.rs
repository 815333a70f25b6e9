//! Core database infrastructure
//!
//! - `DatabaseConn`: SQLite connection wrapper with configuration
//! - `SchemaManager`: control table bootstrap and version status
//! - `SchemaStatus`: schema state enumeration

mod connection;
mod schema;

pub use connection::{DatabaseConn, DEFAULT_BUSY_TIMEOUT};
pub use schema::{SchemaManager, SchemaStatus};

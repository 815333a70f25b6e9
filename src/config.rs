use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::migrate::{
    Dialect, LockOptions, VersionMarker, DEFAULT_VERSION_KEY, DEFAULT_VERSION_TABLE,
};

#[derive(Debug, Clone, Serialize)]
pub struct SchemactlConfig {
    /// Path to the SQLite database to migrate
    pub database_path: String,

    /// Dialect used when rendering plans as SQL (default: sqlite)
    pub dialect: Dialect,

    /// Control table holding the version marker (default: CALENDARSERVER)
    pub version_table: String,

    /// Key of the version marker row (default: VERSION)
    pub version_key: String,

    /// Bounded wait for the migration lock in seconds (default: 30)
    pub lock_timeout_secs: u64,

    /// Delay between lock acquisition attempts in milliseconds (default: 250)
    pub lock_poll_interval_ms: u64,

    /// SQLite busy timeout in milliseconds (default: 1000)
    pub busy_timeout_ms: u64,
}

const EMPTY_CONFIG: &str = r#"### schemactl configuration file

### database to migrate
# database_path = "~/.schemactl/calendar.sqlite3"

### dialect used by `schemactl plan --sql`: sqlite, postgres, oracle
# dialect = "sqlite"

### location of the schema version marker
# version_table = "CALENDARSERVER"
# version_key = "VERSION"

### migration lock settings
# lock_timeout_secs = 30
# lock_poll_interval_ms = 250
# busy_timeout_ms = 1000
"#;

fn home_dir() -> String {
    dirs::home_dir()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string())
}

impl Default for SchemactlConfig {
    fn default() -> Self {
        Self {
            database_path: format!("{}/.schemactl/calendar.sqlite3", home_dir()),
            dialect: Dialect::Sqlite,
            version_table: DEFAULT_VERSION_TABLE.to_string(),
            version_key: DEFAULT_VERSION_KEY.to_string(),
            lock_timeout_secs: 30,
            lock_poll_interval_ms: 250,
            busy_timeout_ms: 1000,
        }
    }
}

impl SchemactlConfig {
    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<SchemactlConfig> {
        // Pick up SCHEMACTL_* variables from a local .env file, if any
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();

        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();

        let schemactl_dir = format!("{}/.schemactl", home_dir.as_str());

        // Add in toml configuration file
        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(schemactl_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create schemactl directory: {}", e))?;
                let p = format!("{}/schemactl.toml", schemactl_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // Add in settings from the environment (with a prefix of SCHEMACTL)
        // E.g., `SCHEMACTL_DATABASE_PATH=/tmp/cal.db ./schemactl status`
        builder = builder.add_source(config::Environment::with_prefix("SCHEMACTL"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config, &home_dir)
    }

    /// Build a configuration from flat key/value settings, using defaults
    /// for anything missing
    fn from_map(config: &HashMap<String, String>, home_dir: &str) -> Result<SchemactlConfig> {
        let defaults = SchemactlConfig::default();

        let database_path = match config.get("database_path") {
            Some(p) => expand_home(p, home_dir),
            None => defaults.database_path,
        };

        let dialect = match config.get("dialect") {
            Some(d) => d.parse::<Dialect>().map_err(|e| anyhow!(e))?,
            None => defaults.dialect,
        };

        let version_table = config
            .get("version_table")
            .cloned()
            .unwrap_or(defaults.version_table);
        let version_key = config
            .get("version_key")
            .cloned()
            .unwrap_or(defaults.version_key);

        let parse_u64 = |key: &str, default: u64| -> Result<u64> {
            match config.get(key) {
                Some(v) => v
                    .parse()
                    .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", v, key, e)),
                None => Ok(default),
            }
        };

        Ok(SchemactlConfig {
            database_path,
            dialect,
            version_table,
            version_key,
            lock_timeout_secs: parse_u64("lock_timeout_secs", defaults.lock_timeout_secs)?,
            lock_poll_interval_ms: parse_u64(
                "lock_poll_interval_ms",
                defaults.lock_poll_interval_ms,
            )?,
            busy_timeout_ms: parse_u64("busy_timeout_ms", defaults.busy_timeout_ms)?,
        })
    }

    /// Location of the version marker
    pub fn version_marker(&self) -> VersionMarker {
        VersionMarker::new(self.version_table.as_str(), self.version_key.as_str())
    }

    /// Migration lock timing
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_secs(self.lock_timeout_secs),
            poll_interval: Duration::from_millis(self.lock_poll_interval_ms),
        }
    }

    /// Get SQLite busy timeout as Duration
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let lines = [
            format!("Config File:        {}", Self::config_file_path()),
            format!("Database Path:      {}", self.database_path),
            format!("Dialect:            {}", self.dialect),
            format!(
                "Version Marker:     {}.{}",
                self.version_table, self.version_key
            ),
            format!("Lock Timeout:       {} seconds", self.lock_timeout_secs),
            format!("Lock Poll Interval: {} ms", self.lock_poll_interval_ms),
            format!("Busy Timeout:       {} ms", self.busy_timeout_ms),
        ];
        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.schemactl/schemactl.toml", home_dir)
    }
}

fn expand_home(path: &str, home_dir: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => format!("{}/{}", home_dir.trim_end_matches('/'), rest),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchemactlConfig::default();
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert_eq!(config.version_table, "CALENDARSERVER");
        assert_eq!(config.version_key, "VERSION");
        assert_eq!(config.lock_timeout_secs, 30);
        assert!(config.database_path.ends_with("/.schemactl/calendar.sqlite3"));
    }

    #[test]
    fn test_from_map() {
        let mut map = HashMap::new();
        map.insert("database_path".to_string(), "~/data/cal.db".to_string());
        map.insert("dialect".to_string(), "oracle".to_string());
        map.insert("version_table".to_string(), "META".to_string());
        map.insert("lock_timeout_secs".to_string(), "5".to_string());

        let config = SchemactlConfig::from_map(&map, "/home/test").unwrap();
        assert_eq!(config.database_path, "/home/test/data/cal.db");
        assert_eq!(config.dialect, Dialect::Oracle);
        assert_eq!(config.version_marker(), VersionMarker::new("META", "VERSION"));
        assert_eq!(config.lock_options().timeout, Duration::from_secs(5));
        assert_eq!(
            config.lock_options().poll_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_from_map_invalid_values() {
        let mut map = HashMap::new();
        map.insert("dialect".to_string(), "mysql".to_string());
        assert!(SchemactlConfig::from_map(&map, "/home/test").is_err());

        let mut map = HashMap::new();
        map.insert("lock_timeout_secs".to_string(), "soon".to_string());
        assert!(SchemactlConfig::from_map(&map, "/home/test").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemactl.toml");
        std::fs::write(
            &path,
            "database_path = \"/srv/cal.sqlite3\"\nlock_poll_interval_ms = 50\n",
        )
        .unwrap();

        let config = SchemactlConfig::new(&Some(path.to_string_lossy().to_string())).unwrap();
        assert_eq!(config.database_path, "/srv/cal.sqlite3");
        assert_eq!(config.lock_poll_interval_ms, 50);
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.toml");

        SchemactlConfig::new(&Some(path.to_string_lossy().to_string())).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("### schemactl configuration file"));
    }

    #[test]
    fn test_summary() {
        let config = SchemactlConfig {
            database_path: "/test/cal.db".to_string(),
            ..Default::default()
        };
        let summary = config.summary();
        assert!(summary.contains("/test/cal.db"));
        assert!(summary.contains("CALENDARSERVER.VERSION"));
    }
}

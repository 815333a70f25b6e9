//! Calendar store upgrade steps

use crate::migrate::{
    AddColumn, ColumnType, CreateIndex, MigrationError, OnDelete, SchemaVersion, UpgradeSource,
    UpgradeStep, UpsertSingleton, VersionMarker,
};

/// Highest schema version the built-in catalog upgrades to
pub const CALENDAR_STORE_LATEST: SchemaVersion = SchemaVersion::new(29);

/// Upgrade steps for the calendar store schema
///
/// Steps that rewrite the version row target `marker`, so the catalog must be
/// built for the same marker the executor reads and writes.
#[derive(Debug, Clone, Default)]
pub struct CalendarStoreCatalog {
    marker: VersionMarker,
}

impl CalendarStoreCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog for a database keeping its version under `marker`
    pub fn for_marker(marker: VersionMarker) -> Self {
        Self { marker }
    }

    pub fn marker(&self) -> &VersionMarker {
        &self.marker
    }

    fn version_row(&self, version: SchemaVersion) -> UpsertSingleton {
        UpsertSingleton::name_value(
            self.marker.table.as_str(),
            self.marker.key.as_str(),
            version.to_string(),
        )
    }

    /// 28 -> 29: per-home default calendar for polls
    fn default_polls(&self) -> Result<UpgradeStep, MigrationError> {
        UpgradeStep::new(
            28,
            29,
            "Add DEFAULT_POLLS to CALENDAR_HOME_METADATA",
            vec![
                AddColumn::new("CALENDAR_HOME_METADATA", "DEFAULT_POLLS", ColumnType::Integer)
                    .references("CALENDAR", OnDelete::SetNull)
                    .into(),
                CreateIndex::new(
                    "CALENDAR_HOME_METADATA_DEFAULT_POLLS",
                    "CALENDAR_HOME_METADATA",
                    &["DEFAULT_POLLS"],
                )
                .into(),
                self.version_row(SchemaVersion::new(29)).into(),
            ],
        )
    }
}

impl UpgradeSource for CalendarStoreCatalog {
    fn name(&self) -> &str {
        "calendar-store"
    }

    fn steps(&self) -> Result<Vec<UpgradeStep>, MigrationError> {
        Ok(vec![self.default_polls()?])
    }
}

//! Schema versions and upgrade step descriptors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::MigrationError;
use super::operation::Operation;

/// Integer marker identifying which upgrade steps have been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The version directly after this one, if it fits in a `u32`
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Number of single-version increments from `self` up to `other`
    pub fn distance_to(self, other: Self) -> u32 {
        other.0.saturating_sub(self.0)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SchemaVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl FromStr for SchemaVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| MigrationError::InvalidVersion {
                value: s.to_string(),
            })
    }
}

/// One atomic unit moving the schema from `from` to `from + 1`
///
/// Steps are built once by an upgrade source and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeStep {
    from: SchemaVersion,
    to: SchemaVersion,
    description: String,
    operations: Vec<Operation>,
}

impl UpgradeStep {
    /// Build a step, rejecting anything but a single-version increment
    pub fn new(
        from: impl Into<SchemaVersion>,
        to: impl Into<SchemaVersion>,
        description: impl Into<String>,
        operations: Vec<Operation>,
    ) -> Result<Self, MigrationError> {
        let from = from.into();
        let to = to.into();
        if from.next() != Some(to) {
            return Err(MigrationError::NonIncrementalStep { from, to });
        }
        Ok(Self {
            from,
            to,
            description: description.into(),
            operations,
        })
    }

    pub fn from_version(&self) -> SchemaVersion {
        self.from
    }

    pub fn to_version(&self) -> SchemaVersion {
        self.to
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}

impl fmt::Display for UpgradeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!("29".parse::<SchemaVersion>().unwrap(), SchemaVersion(29));
        assert_eq!(" 7 ".parse::<SchemaVersion>().unwrap(), SchemaVersion(7));
        assert!(matches!(
            "twenty".parse::<SchemaVersion>(),
            Err(MigrationError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_next_and_distance() {
        assert_eq!(SchemaVersion(28).next(), Some(SchemaVersion(29)));
        assert_eq!(SchemaVersion(u32::MAX).next(), None);
        assert_eq!(SchemaVersion(3).distance_to(SchemaVersion(7)), 4);
        assert_eq!(SchemaVersion(7).distance_to(SchemaVersion(3)), 0);
    }

    #[test]
    fn test_step_must_increment_by_one() {
        assert!(UpgradeStep::new(28, 29, "ok", vec![]).is_ok());

        let err = UpgradeStep::new(28, 30, "skips a version", vec![]).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::NonIncrementalStep {
                from: SchemaVersion(28),
                to: SchemaVersion(30)
            }
        ));

        assert!(UpgradeStep::new(5, 5, "no-op", vec![]).is_err());
        assert!(UpgradeStep::new(5, 4, "downgrade", vec![]).is_err());
    }
}

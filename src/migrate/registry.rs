//! Registry of available upgrade steps

use std::collections::BTreeMap;

use tracing::debug;

use super::error::MigrationError;
use super::version::{SchemaVersion, UpgradeStep};

/// Something that supplies upgrade steps, e.g. a built-in catalog
pub trait UpgradeSource {
    /// Human-readable name used in logs and status output
    fn name(&self) -> &str;

    fn steps(&self) -> Result<Vec<UpgradeStep>, MigrationError>;
}

/// Upgrade steps keyed by the version they start from
///
/// Each step advances exactly one version and no two steps share a starting
/// version, so the registry can never branch. [`StepRegistry::validate`]
/// additionally rejects gaps.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: BTreeMap<SchemaVersion, UpgradeStep>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a validated registry from every step of `source`
    pub fn from_source(source: &dyn UpgradeSource) -> Result<Self, MigrationError> {
        let mut registry = Self::new();
        for step in source.steps()? {
            registry.register(step)?;
        }
        registry.validate()?;
        debug!(
            "Loaded {} upgrade steps from {}",
            registry.len(),
            source.name()
        );
        Ok(registry)
    }

    /// Build a validated registry from a list of steps
    pub fn from_steps(steps: impl IntoIterator<Item = UpgradeStep>) -> Result<Self, MigrationError> {
        let mut registry = Self::new();
        for step in steps {
            registry.register(step)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn register(&mut self, step: UpgradeStep) -> Result<(), MigrationError> {
        let from = step.from_version();
        if self.steps.contains_key(&from) {
            return Err(MigrationError::DuplicateStep { from });
        }
        self.steps.insert(from, step);
        Ok(())
    }

    /// Check that the steps form one gapless chain from the lowest to the
    /// highest version
    pub fn validate(&self) -> Result<(), MigrationError> {
        let mut expected: Option<SchemaVersion> = None;
        for step in self.steps.values() {
            if let Some(after) = expected {
                if step.from_version() != after {
                    return Err(MigrationError::DiscontinuousChain {
                        after,
                        next: step.from_version(),
                    });
                }
            }
            expected = Some(step.to_version());
        }
        Ok(())
    }

    /// The unique step starting at `version`
    pub fn step_from(&self, version: SchemaVersion) -> Option<&UpgradeStep> {
        self.steps.get(&version)
    }

    /// Lowest version any step starts from
    pub fn earliest_version(&self) -> Option<SchemaVersion> {
        self.steps.keys().next().copied()
    }

    /// Highest version any step leads to
    pub fn latest_version(&self) -> Option<SchemaVersion> {
        self.steps.values().map(|s| s.to_version()).max()
    }

    pub fn steps(&self) -> impl Iterator<Item = &UpgradeStep> {
        self.steps.values()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::operation::Operation;

    fn step(from: u32) -> UpgradeStep {
        UpgradeStep::new(
            from,
            from + 1,
            format!("step {}", from),
            vec![Operation::raw(format!("SELECT {}", from))],
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = StepRegistry::from_steps(vec![step(3), step(1), step(2)]).unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.earliest_version(), Some(SchemaVersion(1)));
        assert_eq!(registry.latest_version(), Some(SchemaVersion(4)));
        assert_eq!(
            registry.step_from(SchemaVersion(2)).map(|s| s.to_version()),
            Some(SchemaVersion(3))
        );
        assert!(registry.step_from(SchemaVersion(4)).is_none());

        let order: Vec<u32> = registry.steps().map(|s| s.from_version().get()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_step() {
        let mut registry = StepRegistry::new();
        registry.register(step(28)).unwrap();
        let err = registry.register(step(28)).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::DuplicateStep {
                from: SchemaVersion(28)
            }
        ));
    }

    #[test]
    fn test_discontinuous_chain() {
        let err = StepRegistry::from_steps(vec![step(1), step(2), step(5)]).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::DiscontinuousChain {
                after: SchemaVersion(3),
                next: SchemaVersion(5)
            }
        ));
    }

    #[test]
    fn test_empty_registry_is_valid() {
        let registry = StepRegistry::new();
        assert!(registry.validate().is_ok());
        assert!(registry.is_empty());
        assert_eq!(registry.latest_version(), None);
    }

    struct FixedSource(Vec<UpgradeStep>);

    impl UpgradeSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn steps(&self) -> Result<Vec<UpgradeStep>, MigrationError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_from_source_validates() {
        let ok = FixedSource(vec![step(10), step(11)]);
        assert_eq!(StepRegistry::from_source(&ok).unwrap().len(), 2);

        let gap = FixedSource(vec![step(10), step(12)]);
        assert!(matches!(
            StepRegistry::from_source(&gap),
            Err(MigrationError::DiscontinuousChain { .. })
        ));
    }
}

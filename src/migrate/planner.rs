//! Migration planning

use serde::Serialize;

use super::error::MigrationError;
use super::registry::StepRegistry;
use super::version::{SchemaVersion, UpgradeStep};

/// Ordered, contiguous chain of steps from `current` to `target`
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan<'r> {
    pub current: SchemaVersion,
    pub target: SchemaVersion,
    pub steps: Vec<&'r UpgradeStep>,
}

impl<'r> MigrationPlan<'r> {
    /// An empty plan means the database is already at the target
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Total number of operations across all steps
    pub fn operation_count(&self) -> usize {
        self.steps.iter().map(|s| s.operations().len()).sum()
    }
}

/// Computes step chains over a validated registry
pub struct MigrationPlanner<'r> {
    registry: &'r StepRegistry,
}

impl<'r> MigrationPlanner<'r> {
    /// Create a planner, failing fast if the registry chain has gaps
    pub fn new(registry: &'r StepRegistry) -> Result<Self, MigrationError> {
        registry.validate()?;
        Ok(Self { registry })
    }

    /// Plan the upgrade from `current` to `target`
    ///
    /// Follows the unique successor of each version, so no search is needed.
    pub fn plan(
        &self,
        current: SchemaVersion,
        target: SchemaVersion,
    ) -> Result<MigrationPlan<'r>, MigrationError> {
        if target < current {
            return Err(MigrationError::TargetBehindCurrent { current, target });
        }

        // A chain is never longer than the registry, whatever the target
        let capacity = self
            .registry
            .len()
            .min(current.distance_to(target) as usize);
        let mut steps = Vec::with_capacity(capacity);
        let mut version = current;
        while version < target {
            let step = self
                .registry
                .step_from(version)
                .ok_or(MigrationError::UnknownTarget {
                    target,
                    reached: version,
                })?;
            steps.push(step);
            version = step.to_version();
        }

        Ok(MigrationPlan {
            current,
            target,
            steps,
        })
    }
}

//! Migration run orchestration
//!
//! A run moves through the following states:
//!
//! ```text
//! Idle -> LockAcquired -> Planning -> Applying(0) -> VersionAdvancing(0)
//!                                  -> Applying(1) -> VersionAdvancing(1)
//!                                  -> ...
//!                                  -> Complete
//! ```
//!
//! Any failure after the lock is taken ends the run in `Aborted`. The lock is
//! released on entering `Complete` or `Aborted`.
//!
//! Each step runs in its own `BEGIN IMMEDIATE` transaction holding both the
//! step's operations and the version marker update, so the stored version
//! only ever names a fully applied step.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::error::{MigrationError, StepFailure};
use super::lock::{default_owner, LockOptions, MigrationLock};
use super::planner::{MigrationPlan, MigrationPlanner};
use super::registry::StepRegistry;
use super::runner::StatementRunner;
use super::version::{SchemaVersion, UpgradeStep};
use super::version_store::{VersionMarker, VersionStore};

/// State of a migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    LockAcquired,
    Planning,
    Applying {
        index: usize,
        from: SchemaVersion,
        to: SchemaVersion,
    },
    VersionAdvancing {
        index: usize,
        from: SchemaVersion,
        to: SchemaVersion,
    },
    Complete,
    Aborted,
}

/// Type alias for run state callback function
///
/// The callback is invoked on every state transition and can be used to
/// drive progress bars or collect run traces.
pub type RunStateCallback = Arc<dyn Fn(&RunState) + Send + Sync>;

/// A step that was committed during a run
#[derive(Debug, Clone, Serialize)]
pub struct AppliedStep {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub description: String,
    pub operations: usize,
    pub duration_ms: u64,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub owner: String,
    pub start_version: SchemaVersion,
    pub end_version: SchemaVersion,
    pub applied: Vec<AppliedStep>,
    pub duration_ms: u64,
}

impl MigrationReport {
    /// True when the database was already at the target
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn statements_executed(&self) -> usize {
        self.applied.iter().map(|s| s.operations).sum()
    }
}

/// Applies upgrade steps to one database
///
/// The executor is the only component that executes step operations or moves
/// the version marker.
pub struct MigrationExecutor<'a> {
    conn: &'a Connection,
    registry: &'a StepRegistry,
    planner: MigrationPlanner<'a>,
    marker: VersionMarker,
    runner: StatementRunner,
    lock_options: LockOptions,
    owner: String,
    on_state: Option<RunStateCallback>,
}

impl<'a> MigrationExecutor<'a> {
    /// Create an executor, validating the registry before anything touches
    /// the database
    pub fn new(conn: &'a Connection, registry: &'a StepRegistry) -> Result<Self, MigrationError> {
        Ok(Self {
            conn,
            registry,
            planner: MigrationPlanner::new(registry)?,
            marker: VersionMarker::default(),
            runner: StatementRunner::sqlite(),
            lock_options: LockOptions::default(),
            owner: default_owner(),
            on_state: None,
        })
    }

    pub fn with_marker(mut self, marker: VersionMarker) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn on_state(mut self, callback: RunStateCallback) -> Self {
        self.on_state = Some(callback);
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn transition(&self, state: RunState) {
        debug!("Migration run {}: {:?}", self.owner, state);
        if let Some(callback) = &self.on_state {
            callback(&state);
        }
    }

    /// Read the stored version without taking the lock
    pub fn current_version(&self) -> Result<SchemaVersion, MigrationError> {
        VersionStore::new(self.conn, &self.marker).read()
    }

    /// Plan from the stored version to `target` without taking the lock
    ///
    /// The result is advisory: another process may migrate in between.
    pub fn pending(&self, target: SchemaVersion) -> Result<MigrationPlan<'a>, MigrationError> {
        let current = self.current_version()?;
        self.planner.plan(current, target)
    }

    /// Migrate to the highest version the registry knows about
    pub fn migrate_to_latest(&self) -> Result<MigrationReport, MigrationError> {
        match self.registry.latest_version() {
            Some(latest) => self.migrate(latest),
            None => {
                let current = self.current_version()?;
                self.migrate(current)
            }
        }
    }

    /// Bring the database to `target`
    ///
    /// On failure the database is left at the last committed version and the
    /// error names the failing step. Nothing is retried.
    pub fn migrate(&self, target: SchemaVersion) -> Result<MigrationReport, MigrationError> {
        let started = Instant::now();
        self.transition(RunState::Idle);

        let lock = MigrationLock::acquire(self.conn, self.owner.as_str(), self.lock_options)?;
        self.transition(RunState::LockAcquired);

        let result = self.run_locked(target, started);

        match &result {
            Ok(_) => self.transition(RunState::Complete),
            Err(e) => {
                warn!("Migration run {} aborted: {}", self.owner, e);
                self.transition(RunState::Aborted);
            }
        }

        match (lock.release(), result) {
            (Ok(()), result) => result,
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(original)) => {
                warn!("Failed to release migration lock after error: {}", e);
                Err(original)
            }
        }
    }

    fn run_locked(
        &self,
        target: SchemaVersion,
        started: Instant,
    ) -> Result<MigrationReport, MigrationError> {
        let start_version = self.current_version()?;

        self.transition(RunState::Planning);
        let plan = self.planner.plan(start_version, target)?;

        if plan.is_empty() {
            info!("Database already at version {}", start_version);
        } else {
            info!(
                "Migrating database from version {} to {} ({} steps)",
                start_version,
                target,
                plan.len()
            );
        }

        let mut applied = Vec::with_capacity(plan.len());
        for (index, step) in plan.steps.iter().enumerate() {
            applied.push(self.apply_step(index, step)?);
        }

        Ok(MigrationReport {
            owner: self.owner.clone(),
            start_version,
            end_version: target,
            applied,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn apply_step(&self, index: usize, step: &UpgradeStep) -> Result<AppliedStep, MigrationError> {
        let from = step.from_version();
        let to = step.to_version();
        let fail = |cause: StepFailure| MigrationError::MigrationFailed { from, to, cause };
        let step_started = Instant::now();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|e| fail(StepFailure::Begin(e)))?;

        self.transition(RunState::Applying { index, from, to });
        if let Err(e) = self.runner.apply(step.operations(), &tx) {
            warn!(
                "Step {} failed at operation #{}, rolling back to version {}",
                step, e.index, from
            );
            rollback(tx);
            return Err(fail(e.into()));
        }

        self.transition(RunState::VersionAdvancing { index, from, to });
        if let Err(e) = VersionStore::new(&tx, &self.marker).write(to) {
            warn!("Failed to record version {}, rolling back: {}", to, e);
            rollback(tx);
            return Err(fail(StepFailure::VersionAdvance(e)));
        }

        // A failed COMMIT leaves the transaction open; dropping it rolls back
        tx.commit().map_err(|e| {
            warn!("Failed to commit step {}, rolled back: {}", step, e);
            fail(StepFailure::Commit(e))
        })?;

        let duration_ms = step_started.elapsed().as_millis() as u64;
        info!(
            "Applied step {} ({}) in {} ms",
            step,
            step.description(),
            duration_ms
        );

        Ok(AppliedStep {
            from,
            to,
            description: step.description().to_string(),
            operations: step.operations().len(),
            duration_ms,
        })
    }
}

fn rollback(tx: Transaction<'_>) {
    if let Err(e) = tx.rollback() {
        warn!("Rollback failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::operation::{AddColumn, ColumnType, CreateIndex, Operation};
    use std::sync::Mutex;
    use std::time::Duration;

    fn create_test_db(version: u32) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE ITEM (ID INTEGER PRIMARY KEY)", [])
            .unwrap();
        let marker = VersionMarker::default();
        conn.execute(&marker.create_table_sql(), []).unwrap();
        VersionStore::new(&conn, &marker)
            .write(SchemaVersion(version))
            .unwrap();
        conn
    }

    fn add_column_step(from: u32, column: &str) -> UpgradeStep {
        UpgradeStep::new(
            from,
            from + 1,
            format!("add {}", column),
            vec![
                AddColumn::new("ITEM", column, ColumnType::Integer).into(),
                CreateIndex::new(format!("ITEM_{}", column), "ITEM", &[column]).into(),
            ],
        )
        .unwrap()
    }

    fn column_exists(conn: &Connection, column: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('ITEM') WHERE name = ?1",
                [column],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    fn quick_lock() -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_migrate_applies_chain() {
        let conn = create_test_db(1);
        let registry = StepRegistry::from_steps(vec![
            add_column_step(1, "A"),
            add_column_step(2, "B"),
            add_column_step(3, "C"),
        ])
        .unwrap();
        let executor = MigrationExecutor::new(&conn, &registry).unwrap();

        let report = executor.migrate(SchemaVersion(3)).unwrap();
        assert_eq!(report.start_version, SchemaVersion(1));
        assert_eq!(report.end_version, SchemaVersion(3));
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.statements_executed(), 4);

        assert!(column_exists(&conn, "A"));
        assert!(column_exists(&conn, "B"));
        assert!(!column_exists(&conn, "C"));
        assert_eq!(executor.current_version().unwrap(), SchemaVersion(3));
        assert_eq!(MigrationLock::holder(&conn).unwrap(), None);

        let report = executor.migrate_to_latest().unwrap();
        assert_eq!(report.applied.len(), 1);
        assert_eq!(executor.current_version().unwrap(), SchemaVersion(4));
    }

    #[test]
    fn test_migrate_at_target_is_noop() {
        let conn = create_test_db(2);
        // Operation that would fail if it were ever executed
        let registry = StepRegistry::from_steps(vec![UpgradeStep::new(
            1,
            2,
            "already applied",
            vec![Operation::raw("NOT VALID SQL")],
        )
        .unwrap()])
        .unwrap();
        let executor = MigrationExecutor::new(&conn, &registry).unwrap();

        let report = executor.migrate(SchemaVersion(2)).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.statements_executed(), 0);
        assert_eq!(executor.current_version().unwrap(), SchemaVersion(2));
    }

    #[test]
    fn test_failed_step_rolls_back() {
        let conn = create_test_db(1);
        let broken = UpgradeStep::new(
            2,
            3,
            "broken",
            vec![
                AddColumn::new("ITEM", "PARTIAL", ColumnType::Integer).into(),
                Operation::raw("CREATE INDEX BROKEN ON MISSING_TABLE(X)"),
                AddColumn::new("ITEM", "NEVER", ColumnType::Integer).into(),
            ],
        )
        .unwrap();
        let registry = StepRegistry::from_steps(vec![
            add_column_step(1, "A"),
            broken,
            add_column_step(3, "C"),
        ])
        .unwrap();
        let executor = MigrationExecutor::new(&conn, &registry).unwrap();

        let err = executor.migrate(SchemaVersion(4)).unwrap_err();
        match &err {
            MigrationError::MigrationFailed { from, to, cause } => {
                assert_eq!(*from, SchemaVersion(2));
                assert_eq!(*to, SchemaVersion(3));
                assert_eq!(cause.operation_index(), Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), 7);

        // First step committed, second left no trace
        assert_eq!(executor.current_version().unwrap(), SchemaVersion(2));
        assert!(column_exists(&conn, "A"));
        assert!(!column_exists(&conn, "PARTIAL"));
        assert!(!column_exists(&conn, "NEVER"));
        assert!(!column_exists(&conn, "C"));
        assert_eq!(MigrationLock::holder(&conn).unwrap(), None);
    }

    #[test]
    fn test_failed_version_write_rolls_back() {
        let conn = create_test_db(1);
        let step = UpgradeStep::new(
            1,
            2,
            "moves the marker table away",
            vec![
                AddColumn::new("ITEM", "ORPHAN", ColumnType::Integer).into(),
                Operation::raw("ALTER TABLE CALENDARSERVER RENAME TO CALENDARSERVER_OLD"),
            ],
        )
        .unwrap();
        let registry = StepRegistry::from_steps(vec![step]).unwrap();
        let executor = MigrationExecutor::new(&conn, &registry).unwrap();

        let err = executor.migrate(SchemaVersion(2)).unwrap_err();
        match &err {
            MigrationError::MigrationFailed { from, to, cause } => {
                assert_eq!((*from, *to), (SchemaVersion(1), SchemaVersion(2)));
                assert!(matches!(cause, StepFailure::VersionAdvance(_)));
                assert_eq!(cause.operation_index(), None);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(executor.current_version().unwrap(), SchemaVersion(1));
        assert!(!column_exists(&conn, "ORPHAN"));
        let renamed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'CALENDARSERVER_OLD'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(renamed, 0);
        assert_eq!(MigrationLock::holder(&conn).unwrap(), None);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let conn = create_test_db(1);
        conn.execute_batch("PRAGMA foreign_keys=ON").unwrap();

        // Deferred foreign keys are only checked at COMMIT
        let step = UpgradeStep::new(
            1,
            2,
            "inserts a dangling reference",
            vec![
                Operation::raw("CREATE TABLE PARENT (ID INTEGER PRIMARY KEY)"),
                Operation::raw(
                    "CREATE TABLE CHILD (PARENT_ID INTEGER REFERENCES PARENT(ID) \
                     DEFERRABLE INITIALLY DEFERRED)",
                ),
                Operation::raw("INSERT INTO CHILD (PARENT_ID) VALUES (42)"),
            ],
        )
        .unwrap();
        let registry = StepRegistry::from_steps(vec![step]).unwrap();
        let executor = MigrationExecutor::new(&conn, &registry).unwrap();

        let err = executor.migrate(SchemaVersion(2)).unwrap_err();
        match &err {
            MigrationError::MigrationFailed { cause, .. } => {
                assert!(matches!(cause, StepFailure::Commit(_)));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(conn.is_autocommit());
        assert_eq!(executor.current_version().unwrap(), SchemaVersion(1));
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('PARENT', 'CHILD')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
        assert_eq!(MigrationLock::holder(&conn).unwrap(), None);
    }

    #[test]
    fn test_planning_errors_propagate_and_release_lock() {
        let conn = create_test_db(3);
        let registry =
            StepRegistry::from_steps(vec![add_column_step(1, "A"), add_column_step(2, "B")]).unwrap();
        let executor = MigrationExecutor::new(&conn, &registry).unwrap();

        assert!(matches!(
            executor.migrate(SchemaVersion(2)),
            Err(MigrationError::TargetBehindCurrent { .. })
        ));
        assert!(matches!(
            executor.migrate(SchemaVersion(9)),
            Err(MigrationError::UnknownTarget { .. })
        ));
        assert_eq!(MigrationLock::holder(&conn).unwrap(), None);
        assert_eq!(executor.current_version().unwrap(), SchemaVersion(3));
    }

    #[test]
    fn test_not_initialized() {
        let conn = Connection::open_in_memory().unwrap();
        let registry = StepRegistry::from_steps(vec![add_column_step(1, "A")]).unwrap();
        let executor = MigrationExecutor::new(&conn, &registry).unwrap();

        let err = executor.migrate(SchemaVersion(2)).unwrap_err();
        assert!(matches!(err, MigrationError::NotInitialized { .. }));
        assert_eq!(err.exit_code(), 8);
    }

    #[test]
    fn test_broken_registry_rejected_up_front() {
        let conn = create_test_db(1);
        let mut registry = StepRegistry::new();
        registry.register(add_column_step(1, "A")).unwrap();
        registry.register(add_column_step(5, "E")).unwrap();

        assert!(matches!(
            MigrationExecutor::new(&conn, &registry),
            Err(MigrationError::DiscontinuousChain { .. })
        ));
        assert!(!column_exists(&conn, "A"));
    }

    #[test]
    fn test_lock_held_elsewhere_times_out() {
        let conn = create_test_db(1);
        let registry = StepRegistry::from_steps(vec![add_column_step(1, "A")]).unwrap();
        let executor = MigrationExecutor::new(&conn, &registry)
            .unwrap()
            .with_lock_options(quick_lock());

        let other = MigrationLock::acquire(&conn, "other-process", quick_lock()).unwrap();
        let err = executor.migrate(SchemaVersion(2)).unwrap_err();
        assert!(matches!(err, MigrationError::LockTimeout { .. }));
        assert_eq!(err.exit_code(), 3);
        assert!(!column_exists(&conn, "A"));

        other.release().unwrap();
        executor.migrate(SchemaVersion(2)).unwrap();
        assert!(column_exists(&conn, "A"));
    }

    #[test]
    fn test_state_transitions() {
        let conn = create_test_db(1);
        let registry =
            StepRegistry::from_steps(vec![add_column_step(1, "A"), add_column_step(2, "B")]).unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        let executor = MigrationExecutor::new(&conn, &registry)
            .unwrap()
            .on_state(Arc::new(move |s: &RunState| {
                sink.lock().unwrap().push(s.clone());
            }));

        executor.migrate(SchemaVersion(3)).unwrap();

        let v = SchemaVersion;
        assert_eq!(
            *states.lock().unwrap(),
            vec![
                RunState::Idle,
                RunState::LockAcquired,
                RunState::Planning,
                RunState::Applying { index: 0, from: v(1), to: v(2) },
                RunState::VersionAdvancing { index: 0, from: v(1), to: v(2) },
                RunState::Applying { index: 1, from: v(2), to: v(3) },
                RunState::VersionAdvancing { index: 1, from: v(2), to: v(3) },
                RunState::Complete,
            ]
        );
    }

    #[test]
    fn test_failure_ends_in_aborted() {
        let conn = create_test_db(1);
        let registry = StepRegistry::from_steps(vec![UpgradeStep::new(
            1,
            2,
            "broken",
            vec![Operation::raw("NOT VALID SQL")],
        )
        .unwrap()])
        .unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        let executor = MigrationExecutor::new(&conn, &registry)
            .unwrap()
            .on_state(Arc::new(move |s: &RunState| {
                sink.lock().unwrap().push(s.clone());
            }));

        assert!(executor.migrate(SchemaVersion(2)).is_err());
        let states = states.lock().unwrap();
        assert_eq!(states.last(), Some(&RunState::Aborted));
        assert!(!states.contains(&RunState::Complete));
    }

    #[test]
    fn test_pending_does_not_lock_or_mutate() {
        let conn = create_test_db(1);
        let registry =
            StepRegistry::from_steps(vec![add_column_step(1, "A"), add_column_step(2, "B")]).unwrap();
        let executor = MigrationExecutor::new(&conn, &registry).unwrap();

        let plan = executor.pending(SchemaVersion(3)).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.operation_count(), 4);
        assert_eq!(executor.current_version().unwrap(), SchemaVersion(1));
        assert!(!column_exists(&conn, "A"));
    }
}

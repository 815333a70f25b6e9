//! Statement execution for upgrade steps

use rusqlite::Transaction;
use tracing::debug;

use super::dialect::Dialect;
use super::error::StatementError;
use super::operation::Operation;

/// Executes a step's operations, in order, on a caller-owned transaction
///
/// The runner never commits or rolls back. On the first failing operation it
/// stops and reports the operation's index; undoing the earlier operations of
/// the step is left to the transaction owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementRunner {
    dialect: Dialect,
}

impl StatementRunner {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Runner for the bundled SQLite driver
    pub fn sqlite() -> Self {
        Self {
            dialect: Dialect::Sqlite,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Render all operations without executing them
    pub fn render(&self, operations: &[Operation]) -> Vec<String> {
        operations.iter().map(|op| self.dialect.render(op)).collect()
    }

    /// Execute `operations` on `tx`, returning how many ran
    pub fn apply(&self, operations: &[Operation], tx: &Transaction<'_>) -> Result<usize, StatementError> {
        for (index, operation) in operations.iter().enumerate() {
            let statement = self.dialect.render(operation);
            debug!("Executing operation #{}: {}", index, statement);
            tx.execute_batch(&statement)
                .map_err(|cause| StatementError {
                    index,
                    statement,
                    cause,
                })?;
        }
        Ok(operations.len())
    }
}

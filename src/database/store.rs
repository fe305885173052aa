use async_trait::async_trait;

use crate::database::manager::DatabaseError;
use crate::purge::graph::{RawStatement, TableBinding};

/// Data-access handle consumed by the purge engine.
///
/// Implementations hand out one exclusively owned transaction per purge; the
/// engine never holds a process-wide client.
#[async_trait]
pub trait PurgeStore: Send + Sync {
    /// Whether the legacy user row exists, checked outside any transaction
    async fn user_exists(&self, user_id: i64) -> Result<bool, DatabaseError>;

    async fn begin(&self) -> Result<Box<dyn PurgeTransaction>, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

/// One open transaction. Dropping it without `commit` discards every change.
#[async_trait]
pub trait PurgeTransaction: Send {
    /// Serialize purges of the same user across processes
    async fn lock_user(&mut self, user_id: i64) -> Result<(), DatabaseError>;

    /// Ids of rows in `table` whose `column` is in `values`, locked for update
    async fn select_ids(
        &mut self,
        table: &'static str,
        column: &'static str,
        values: &[i64],
    ) -> Result<Vec<i64>, DatabaseError>;

    /// Delete-many through a bound statement, `match_column IN values`
    async fn delete_structured(&mut self, binding: TableBinding, values: &[i64]) -> Result<u64, DatabaseError>;

    /// Raw parameterized delete, `match_column = value`
    async fn delete_raw(&mut self, statement: &RawStatement, value: i64) -> Result<u64, DatabaseError>;

    async fn savepoint(&mut self) -> Result<(), DatabaseError>;

    async fn release_savepoint(&mut self) -> Result<(), DatabaseError>;

    async fn rollback_to_savepoint(&mut self) -> Result<(), DatabaseError>;

    async fn commit(&mut self) -> Result<(), DatabaseError>;

    async fn rollback(&mut self) -> Result<(), DatabaseError>;
}

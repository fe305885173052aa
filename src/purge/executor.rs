use std::time::Instant;

use tracing::{debug, warn};

use crate::database::manager::DatabaseError;
use crate::database::store::PurgeTransaction;
use crate::purge::graph::{Access, DeletableByColumn, GraphEntry, RawStatement, Reference};
use crate::purge::resolver::OwnedIds;
use crate::purge::summary::StepOutcome;

/// Run one graph entry against the open transaction.
///
/// Never fails: an error is rolled back to the step's savepoint, logged and
/// returned as `StepOutcome::Failed` so the walk can continue.
pub async fn run_step(
    tx: &mut dyn PurgeTransaction,
    entry: &GraphEntry,
    user_id: i64,
    owned: &OwnedIds,
) -> StepOutcome {
    let direct = [user_id];
    let targets: &[i64] = match entry.reference {
        Reference::Direct => &direct,
        Reference::Via(kind) => owned.ids(kind),
    };

    if targets.is_empty() {
        debug!("Step {} skipped: no {} ids", entry.table(), entry.reference);
        return StepOutcome::Skipped;
    }

    let started = Instant::now();
    match delete_isolated(tx, entry, targets).await {
        Ok(rows) => {
            debug!(
                "Step {} deleted {} rows in {:?}",
                entry.table(),
                rows,
                started.elapsed()
            );
            StepOutcome::Deleted { rows }
        }
        Err(error) => {
            warn!(
                "Step {} failed, continuing with 0 rows: {}",
                entry.table(),
                error
            );
            StepOutcome::Failed {
                message: error.to_string(),
            }
        }
    }
}

async fn delete_isolated(
    tx: &mut dyn PurgeTransaction,
    entry: &GraphEntry,
    targets: &[i64],
) -> Result<u64, DatabaseError> {
    tx.savepoint().await?;
    let result = match &entry.access {
        Access::Structured(binding) => tx.delete_structured(*binding, targets).await,
        Access::Raw(statement) => delete_raw_each(tx, statement, targets).await,
    };
    isolated(tx, result).await
}

async fn delete_raw_each(
    tx: &mut dyn PurgeTransaction,
    statement: &RawStatement,
    targets: &[i64],
) -> Result<u64, DatabaseError> {
    let mut rows = 0;
    for value in targets {
        rows += tx.delete_raw(statement, *value).await?;
    }
    Ok(rows)
}

/// Settle the savepoint opened before `result` was produced: release it on
/// success, roll back to it on failure. A release that fails is rolled back
/// too, so a step never keeps writes it reports as failed. The original error
/// is returned.
pub(crate) async fn isolated<T>(
    tx: &mut dyn PurgeTransaction,
    result: Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    let error = match result {
        Ok(value) => match tx.release_savepoint().await {
            Ok(()) => return Ok(value),
            Err(error) => error,
        },
        Err(error) => error,
    };

    if let Err(rollback_error) = tx.rollback_to_savepoint().await {
        warn!("Rollback to savepoint failed: {}", rollback_error);
    }
    Err(error)
}

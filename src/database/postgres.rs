use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::store::{PurgeStore, PurgeTransaction};
use crate::purge::graph::{DeletableByColumn, RawStatement, TableBinding};

const STEP_SAVEPOINT: &str = "purge_step";

/// First key of the two-key advisory lock. Two-key locks never collide with
/// single bigint-key locks taken elsewhere in the database.
const PURGE_LOCK_CLASS: i32 = 0x7075_7267; // "purg"

const LOCK_USER_SQL: &str = "SELECT pg_advisory_xact_lock($1, $2)";

/// Advisory lock keys for a user. Ids wider than 32 bits are folded, so two
/// users may share a key; that only serializes their purges.
fn advisory_lock_keys(user_id: i64) -> (i32, i32) {
    (PURGE_LOCK_CLASS, (user_id ^ (user_id >> 32)) as i32)
}

/// Postgres-backed purge store
#[derive(Clone)]
pub struct PgPurgeStore {
    pool: PgPool,
    log_queries: bool,
}

impl PgPurgeStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            log_queries: false,
        }
    }

    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }
}

#[async_trait]
impl PurgeStore for PgPurgeStore {
    async fn user_exists(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn begin(&self) -> Result<Box<dyn PurgeTransaction>, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgPurgeTransaction {
            tx: Some(tx),
            log_queries: self.log_queries,
        }))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}

/// Open transaction on a pooled connection.
///
/// sqlx rolls the transaction back when it is dropped unfinished, which is
/// what a timed-out purge relies on.
pub struct PgPurgeTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    log_queries: bool,
}

impl PgPurgeTransaction {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, DatabaseError> {
        self.tx.as_mut().ok_or(DatabaseError::TransactionClosed)
    }

    fn log(&self, sql: &str) {
        if self.log_queries {
            tracing::debug!("SQL: {}", sql);
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        self.log(sql);
        let tx = self.tx()?;
        sqlx::query(sql).execute(&mut **tx).await?;
        Ok(())
    }
}

#[async_trait]
impl PurgeTransaction for PgPurgeTransaction {
    async fn lock_user(&mut self, user_id: i64) -> Result<(), DatabaseError> {
        let (class, key) = advisory_lock_keys(user_id);
        self.log(LOCK_USER_SQL);
        let tx = self.tx()?;
        sqlx::query(LOCK_USER_SQL)
            .bind(class)
            .bind(key)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn select_ids(
        &mut self,
        table: &'static str,
        column: &'static str,
        values: &[i64],
    ) -> Result<Vec<i64>, DatabaseError> {
        let sql = format!(
            "SELECT id::bigint FROM {} WHERE {} = ANY($1) FOR UPDATE",
            DatabaseManager::quote_identifier(table)?,
            DatabaseManager::quote_identifier(column)?
        );
        self.log(&sql);

        let tx = self.tx()?;
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(values.to_vec())
            .fetch_all(&mut **tx)
            .await?;
        Ok(ids)
    }

    async fn delete_structured(&mut self, binding: TableBinding, values: &[i64]) -> Result<u64, DatabaseError> {
        let sql = binding.delete_statement();
        self.log(sql);

        let tx = self.tx()?;
        let result = sqlx::query(sql).bind(values.to_vec()).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn delete_raw(&mut self, statement: &RawStatement, value: i64) -> Result<u64, DatabaseError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            DatabaseManager::quote_identifier(statement.table())?,
            DatabaseManager::quote_identifier(statement.match_column())?
        );
        self.log(&sql);

        let tx = self.tx()?;
        let result = sqlx::query(&sql).bind(value).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn savepoint(&mut self) -> Result<(), DatabaseError> {
        self.execute(&format!("SAVEPOINT {}", STEP_SAVEPOINT)).await
    }

    async fn release_savepoint(&mut self) -> Result<(), DatabaseError> {
        self.execute(&format!("RELEASE SAVEPOINT {}", STEP_SAVEPOINT)).await
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), DatabaseError> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", STEP_SAVEPOINT)).await
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        let tx = self.tx.take().ok_or(DatabaseError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        let tx = self.tx.take().ok_or(DatabaseError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}

//! In-memory purge store for unit tests.
//!
//! Tables hold integer columns only. A transaction works on a copy of the
//! committed state and writes it back on commit, so dropping or rolling back
//! a transaction leaves the store untouched. Faults can be injected per
//! table, per raw value, on the root delete, and as a per-statement delay.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::database::manager::DatabaseError;
use crate::database::store::{PurgeStore, PurgeTransaction};
use crate::purge::graph::{DeletableByColumn, RawStatement, TableBinding, DELETION_GRAPH, ROOT};

type Row = BTreeMap<String, i64>;

#[derive(Debug, Clone, Default)]
struct Table {
    columns: BTreeSet<String>,
    rows: Vec<Row>,
}

type Tables = BTreeMap<String, Table>;

#[derive(Debug, Default)]
struct Faults {
    failing_tables: HashSet<String>,
    failing_raw_values: HashSet<(String, i64)>,
    fail_root_delete: bool,
    fail_begin: bool,
    fail_release_savepoint: bool,
    statement_delay: Option<Duration>,
    stall_after_commit: Option<Duration>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    begins: AtomicUsize,
    commits: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users, owned tables, and every table in the deletion graph
    pub fn with_campus_schema() -> Self {
        let store = Self::new();
        store.create_table(ROOT.table(), &["id"]);
        store.create_table("students", &["id", "user_id"]);
        store.create_table("enrollments", &["id", "user_id", "student_id"]);
        for entry in DELETION_GRAPH.iter() {
            if !store.has_table(entry.table()) {
                store.create_table(entry.table(), &["id", entry.match_column()]);
            }
        }
        store
    }

    pub fn create_table(&self, name: &str, columns: &[&str]) {
        let table = Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        };
        lock(&self.shared.tables).insert(name.to_string(), table);
    }

    pub fn drop_table(&self, name: &str) {
        lock(&self.shared.tables).remove(name);
    }

    pub fn has_table(&self, name: &str) -> bool {
        lock(&self.shared.tables).contains_key(name)
    }

    pub fn insert(&self, table: &str, values: &[(&str, i64)]) {
        let mut tables = lock(&self.shared.tables);
        let table = tables
            .get_mut(table)
            .unwrap_or_else(|| panic!("no table {}", table));
        let row = values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        table.rows.push(row);
    }

    pub fn count(&self, table: &str) -> usize {
        lock(&self.shared.tables)
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    pub fn count_where(&self, table: &str, column: &str, value: i64) -> usize {
        self.column_values(table, column)
            .into_iter()
            .filter(|v| *v == value)
            .count()
    }

    pub fn column_values(&self, table: &str, column: &str) -> Vec<i64> {
        lock(&self.shared.tables)
            .get(table)
            .map(|t| t.rows.iter().filter_map(|r| r.get(column).copied()).collect())
            .unwrap_or_default()
    }

    /// Full copy of the committed state, for before/after comparisons
    pub fn snapshot(&self) -> BTreeMap<String, Vec<BTreeMap<String, i64>>> {
        lock(&self.shared.tables)
            .iter()
            .map(|(name, t)| (name.clone(), t.rows.clone()))
            .collect()
    }

    pub fn fail_table(&self, name: &str) {
        lock(&self.shared.faults).failing_tables.insert(name.to_string());
    }

    pub fn fail_raw_value(&self, table: &str, value: i64) {
        lock(&self.shared.faults)
            .failing_raw_values
            .insert((table.to_string(), value));
    }

    pub fn fail_root_delete(&self) {
        lock(&self.shared.faults).fail_root_delete = true;
    }

    pub fn fail_begin(&self) {
        lock(&self.shared.faults).fail_begin = true;
    }

    pub fn fail_release_savepoint(&self) {
        lock(&self.shared.faults).fail_release_savepoint = true;
    }

    /// Commit applies, then the call hangs for `stall` before returning
    pub fn stall_after_commit(&self, stall: Duration) {
        lock(&self.shared.faults).stall_after_commit = Some(stall);
    }

    pub fn delay_statements(&self, delay: Duration) {
        lock(&self.shared.faults).statement_delay = Some(delay);
    }

    pub fn begins(&self) -> usize {
        self.shared.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PurgeStore for MemoryStore {
    async fn user_exists(&self, user_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.count_where(ROOT.table(), ROOT.match_column(), user_id) > 0)
    }

    async fn begin(&self) -> Result<Box<dyn PurgeTransaction>, DatabaseError> {
        self.shared.begins.fetch_add(1, Ordering::SeqCst);
        if lock(&self.shared.faults).fail_begin {
            return Err(DatabaseError::QueryError("connection refused".to_string()));
        }
        let working = lock(&self.shared.tables).clone();
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            working: Some(working),
            savepoint: None,
        }))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

pub struct MemoryTransaction {
    store: MemoryStore,
    working: Option<Tables>,
    savepoint: Option<Tables>,
}

impl MemoryTransaction {
    fn working(&mut self) -> Result<&mut Tables, DatabaseError> {
        self.working.as_mut().ok_or(DatabaseError::TransactionClosed)
    }

    async fn pause(&self) {
        let delay = lock(&self.store.shared.faults).statement_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_table(&self, table: &str) -> Result<(), DatabaseError> {
        if lock(&self.store.shared.faults).failing_tables.contains(table) {
            return Err(DatabaseError::QueryError(format!(
                "injected failure on \"{}\"",
                table
            )));
        }
        Ok(())
    }

    fn delete_where(&mut self, table: &str, column: &str, values: &[i64]) -> Result<u64, DatabaseError> {
        let table = find_table(self.working()?, table, column)?;
        let before = table.rows.len();
        table
            .rows
            .retain(|row| !row.get(column).is_some_and(|v| values.contains(v)));
        Ok((before - table.rows.len()) as u64)
    }
}

fn find_table<'a>(tables: &'a mut Tables, table: &str, column: &str) -> Result<&'a mut Table, DatabaseError> {
    let found = tables
        .get_mut(table)
        .ok_or_else(|| DatabaseError::QueryError(format!("relation \"{}\" does not exist", table)))?;
    if !found.columns.contains(column) {
        return Err(DatabaseError::QueryError(format!(
            "column \"{}\" of relation \"{}\" does not exist",
            column, table
        )));
    }
    Ok(found)
}

#[async_trait]
impl PurgeTransaction for MemoryTransaction {
    async fn lock_user(&mut self, _user_id: i64) -> Result<(), DatabaseError> {
        self.working()?;
        Ok(())
    }

    async fn select_ids(
        &mut self,
        table: &'static str,
        column: &'static str,
        values: &[i64],
    ) -> Result<Vec<i64>, DatabaseError> {
        self.pause().await;
        self.check_table(table)?;
        let found = find_table(self.working()?, table, column)?;
        Ok(found
            .rows
            .iter()
            .filter(|row| row.get(column).is_some_and(|v| values.contains(v)))
            .filter_map(|row| row.get("id").copied())
            .collect())
    }

    async fn delete_structured(&mut self, binding: TableBinding, values: &[i64]) -> Result<u64, DatabaseError> {
        self.pause().await;
        if binding == ROOT && lock(&self.store.shared.faults).fail_root_delete {
            return Err(DatabaseError::QueryError(
                "update or delete on table \"users\" violates foreign key constraint".to_string(),
            ));
        }
        self.check_table(binding.table())?;
        self.delete_where(binding.table(), binding.match_column(), values)
    }

    async fn delete_raw(&mut self, statement: &RawStatement, value: i64) -> Result<u64, DatabaseError> {
        self.pause().await;
        self.check_table(statement.table)?;
        if lock(&self.store.shared.faults)
            .failing_raw_values
            .contains(&(statement.table.to_string(), value))
        {
            return Err(DatabaseError::QueryError(format!(
                "injected failure on \"{}\" = {}",
                statement.table, value
            )));
        }
        self.delete_where(statement.table, statement.match_column, &[value])
    }

    async fn savepoint(&mut self) -> Result<(), DatabaseError> {
        let copy = self.working()?.clone();
        self.savepoint = Some(copy);
        Ok(())
    }

    async fn release_savepoint(&mut self) -> Result<(), DatabaseError> {
        self.working()?;
        if lock(&self.store.shared.faults).fail_release_savepoint {
            return Err(DatabaseError::QueryError(
                "savepoint \"purge_step\" does not exist".to_string(),
            ));
        }
        self.savepoint = None;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), DatabaseError> {
        let restored = self
            .savepoint
            .take()
            .ok_or_else(|| DatabaseError::QueryError("no such savepoint".to_string()))?;
        *self.working()? = restored;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        let working = self.working.take().ok_or(DatabaseError::TransactionClosed)?;
        *lock(&self.store.shared.tables) = working;
        self.store.shared.commits.fetch_add(1, Ordering::SeqCst);

        let stall = lock(&self.store.shared.faults).stall_after_commit;
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.working.take().ok_or(DatabaseError::TransactionClosed)?;
        self.savepoint = None;
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one graph entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Deleted { rows: u64 },
    /// No owned ids to match; nothing to do
    Skipped,
    /// The statement failed and was rolled back to its savepoint
    Failed { message: String },
}

impl StepOutcome {
    pub fn rows(&self) -> u64 {
        match self {
            StepOutcome::Deleted { rows } => *rows,
            StepOutcome::Skipped | StepOutcome::Failed { .. } => 0,
        }
    }
}

/// A step that failed and was skipped while the purge carried on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub table: &'static str,
    pub message: String,
}

/// Accumulates per-table results while a purge runs
#[derive(Debug)]
pub struct PurgeReport {
    user_id: i64,
    started: Instant,
    tables: BTreeMap<&'static str, u64>,
    failures: Vec<StepFailure>,
}

impl PurgeReport {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            started: Instant::now(),
            tables: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Record one graph entry; zero and skipped entries are kept too
    pub fn record(&mut self, table: &'static str, outcome: &StepOutcome) {
        *self.tables.entry(table).or_insert(0) += outcome.rows();
        if let StepOutcome::Failed { message } = outcome {
            self.record_failure(table, message.clone());
        }
    }

    pub fn record_failure(&mut self, table: &'static str, message: String) {
        self.failures.push(StepFailure { table, message });
    }

    pub fn summary(self, dry_run: bool) -> PurgeSummary {
        let total_rows: u64 = self.tables.values().sum();
        let tables_affected = self.tables.values().filter(|rows| **rows > 0).count();

        let mut message = if dry_run {
            format!(
                "Would delete legacy user {}: {} rows across {} tables",
                self.user_id, total_rows, tables_affected
            )
        } else {
            format!(
                "Deleted legacy user {}: {} rows across {} tables removed",
                self.user_id, total_rows, tables_affected
            )
        };
        if !self.failures.is_empty() {
            let skipped = self.failures.len();
            let noun = if skipped == 1 { "step" } else { "steps" };
            message.push_str(&format!(" ({} {} skipped after errors)", skipped, noun));
        }

        PurgeSummary {
            user_id: self.user_id,
            dry_run,
            tables: self.tables,
            total_rows,
            tables_affected,
            failed_steps: self.failures,
            message,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        }
    }
}

/// Final, read-only result of a purge
#[derive(Debug, Clone, Serialize)]
pub struct PurgeSummary {
    user_id: i64,
    dry_run: bool,
    tables: BTreeMap<&'static str, u64>,
    total_rows: u64,
    tables_affected: usize,
    failed_steps: Vec<StepFailure>,
    message: String,
    elapsed_ms: u64,
    finished_at: DateTime<Utc>,
}

impl PurgeSummary {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn tables(&self) -> &BTreeMap<&'static str, u64> {
        &self.tables
    }

    pub fn rows_for(&self, table: &str) -> Option<u64> {
        self.tables.get(table).copied()
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn tables_affected(&self) -> usize {
        self.tables_affected
    }

    pub fn failed_steps(&self) -> &[StepFailure] {
        &self.failed_steps
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

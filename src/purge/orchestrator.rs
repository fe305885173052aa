use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::database::store::{PurgeStore, PurgeTransaction};
use crate::purge::error::{FatalReason, PurgeError};
use crate::purge::executor::run_step;
use crate::purge::graph::{DeletableByColumn, GraphEntry, DELETION_GRAPH, ROOT};
use crate::purge::guard::InFlight;
use crate::purge::resolver::resolve_owned_ids;
use crate::purge::summary::{PurgeReport, PurgeSummary, StepOutcome};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Commit,
    Preview,
}

/// Deletes a legacy user and everything in the deletion graph that depends
/// on it, in one transaction.
///
/// `Begin -> Resolve -> [Step]* -> DeleteRoot -> Commit`. Steps never abort
/// the purge; failing to begin, lock, delete the root row or commit rolls
/// everything back. Begin through the root delete is bound to a deadline;
/// the commit is not, so a reported failure always means nothing changed.
pub struct LegacyUserPurger {
    store: Arc<dyn PurgeStore>,
    graph: &'static [GraphEntry],
    in_flight: InFlight,
    timeout: Duration,
}

impl LegacyUserPurger {
    pub fn new(store: Arc<dyn PurgeStore>) -> Self {
        Self {
            store,
            graph: &DELETION_GRAPH,
            in_flight: InFlight::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Purge `user_id` and commit
    pub async fn delete_legacy_user(&self, user_id: i64) -> Result<PurgeSummary, PurgeError> {
        self.purge(user_id, Mode::Commit).await
    }

    /// Run the full purge, report what it would remove, then roll back
    pub async fn preview_legacy_user(&self, user_id: i64) -> Result<PurgeSummary, PurgeError> {
        self.purge(user_id, Mode::Preview).await
    }

    async fn purge(&self, user_id: i64, mode: Mode) -> Result<PurgeSummary, PurgeError> {
        let purge_id = Uuid::new_v4();
        let dry_run = mode == Mode::Preview;
        let span = info_span!("legacy_user_purge", user_id, purge_id = %purge_id, dry_run);

        async move {
            let _claim = self
                .in_flight
                .claim(user_id)
                .ok_or(PurgeError::InProgress(user_id))?;

            match self.store.user_exists(user_id).await {
                Ok(true) => {}
                Ok(false) => return Err(PurgeError::NotFound(user_id)),
                Err(e) => return Err(PurgeError::fatal(user_id, FatalReason::Lookup(e))),
            }

            info!("Purging legacy user {}", user_id);

            // Dropping the unfinished future on timeout drops the open
            // transaction, which rolls it back. Commit runs outside the
            // deadline: once it is sent, only its own outcome is reported.
            let prepared = tokio::time::timeout(self.timeout, self.prepare(user_id));
            let result = match prepared.await {
                Ok(Ok((tx, report))) => finish(tx, report, user_id, mode).await,
                Ok(Err(e)) => Err(e),
                Err(_) => Err(PurgeError::fatal(user_id, FatalReason::Timeout(self.timeout))),
            };

            match &result {
                Ok(summary) => info!("{}", summary.message()),
                Err(e) if e.is_fatal() => error!("{}", e),
                Err(e) => info!("{}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Everything up to and including the root delete, left uncommitted
    async fn prepare(&self, user_id: i64) -> Result<(Box<dyn PurgeTransaction>, PurgeReport), PurgeError> {
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| PurgeError::fatal(user_id, FatalReason::Begin(e)))?;

        if let Err(e) = tx.lock_user(user_id).await {
            abort(tx.as_mut()).await;
            return Err(PurgeError::fatal(user_id, FatalReason::Lock(e)));
        }

        let mut report = PurgeReport::new(user_id);

        let owned = resolve_owned_ids(tx.as_mut(), user_id).await;
        for (kind, message) in owned.failures() {
            report.record_failure(kind.table(), message.clone());
        }

        for entry in self.graph {
            let outcome = run_step(tx.as_mut(), entry, user_id, &owned).await;
            report.record(entry.table(), &outcome);
        }

        match tx.delete_structured(ROOT, &[user_id]).await {
            Ok(0) => {
                // Purged by someone else between the existence check and the lock
                abort(tx.as_mut()).await;
                Err(PurgeError::NotFound(user_id))
            }
            Ok(rows) => {
                report.record(ROOT.table(), &StepOutcome::Deleted { rows });
                Ok((tx, report))
            }
            Err(e) => {
                abort(tx.as_mut()).await;
                Err(PurgeError::fatal(user_id, FatalReason::DeleteRoot(e)))
            }
        }
    }
}

async fn finish(
    mut tx: Box<dyn PurgeTransaction>,
    report: PurgeReport,
    user_id: i64,
    mode: Mode,
) -> Result<PurgeSummary, PurgeError> {
    match mode {
        Mode::Commit => tx
            .commit()
            .await
            .map_err(|e| PurgeError::fatal(user_id, FatalReason::Commit(e)))?,
        Mode::Preview => abort(tx.as_mut()).await,
    }
    Ok(report.summary(mode == Mode::Preview))
}

// An unfinished transaction is discarded on drop anyway; the explicit
// rollback just releases the connection sooner.
async fn abort(tx: &mut dyn PurgeTransaction) {
    if let Err(e) = tx.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}

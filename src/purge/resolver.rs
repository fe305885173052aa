use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::database::store::PurgeTransaction;
use crate::purge::executor::isolated;
use crate::purge::graph::{OwnedKind, OwnershipLink};

/// Ids of every owned entity the legacy user holds, per kind
#[derive(Debug, Default, Clone)]
pub struct OwnedIds {
    ids: BTreeMap<OwnedKind, Vec<i64>>,
    failures: Vec<(OwnedKind, String)>,
}

impl OwnedIds {
    pub fn ids(&self, kind: OwnedKind) -> &[i64] {
        self.ids.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Lookups that failed; the kind resolves to what the other links found
    pub fn failures(&self) -> &[(OwnedKind, String)] {
        &self.failures
    }
}

/// Resolve owned ids for `user_id` inside the purge transaction.
///
/// Kinds are resolved parents first so that ownership through another owned
/// entity (an enrollment held by one of the user's students) is picked up.
/// A failed lookup is logged and treated as contributing no ids, matching
/// the per-step tolerance of the executor.
pub async fn resolve_owned_ids(tx: &mut dyn PurgeTransaction, user_id: i64) -> OwnedIds {
    let mut owned = OwnedIds::default();

    for kind in OwnedKind::RESOLUTION_ORDER {
        let mut found = BTreeSet::new();

        for link in kind.links() {
            let (column, values) = match link {
                OwnershipLink::User { column } => (*column, vec![user_id]),
                OwnershipLink::Through { column, parent } => (*column, owned.ids(*parent).to_vec()),
            };
            if values.is_empty() {
                continue;
            }

            match select_isolated(tx, kind.table(), column, &values).await {
                Ok(ids) => found.extend(ids),
                Err(message) => {
                    warn!(
                        "Could not resolve {} ids through {}.{}: {}",
                        kind, kind.table(), column, message
                    );
                    owned.failures.push((kind, message));
                }
            }
        }

        debug!("Resolved {} {} ids for user {}", found.len(), kind, user_id);
        owned.ids.insert(kind, found.into_iter().collect());
    }

    owned
}

async fn select_isolated(
    tx: &mut dyn PurgeTransaction,
    table: &'static str,
    column: &'static str,
    values: &[i64],
) -> Result<Vec<i64>, String> {
    tx.savepoint().await.map_err(|e| e.to_string())?;
    let result = tx.select_ids(table, column, values).await;
    isolated(tx, result).await.map_err(|e| e.to_string())
}

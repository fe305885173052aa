// handlers/elevated/root/legacy_user/delete.rs - DELETE /api/root/legacy-user/:id handler

use axum::extract::{Path, State};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::purge::PurgeSummary;

/**
 * DELETE /api/root/legacy-user/:id - Remove a legacy user and everything that depends on it
 *
 * Walks the deletion graph in one transaction and deletes the user row last.
 * A failed dependent table is skipped and listed in `failed_steps`; a failure
 * on the user row itself rolls everything back.
 *
 * Expected Output (Success):
 * ```json
 * {
 *   "success": true,
 *   "data": {
 *     "user_id": 500,
 *     "dry_run": false,
 *     "tables": { "payments": 3, "users": 1, ... },
 *     "total_rows": 14,
 *     "tables_affected": 9,
 *     "failed_steps": [],
 *     "message": "Deleted legacy user 500: 14 rows across 9 tables removed"
 *   }
 * }
 * ```
 *
 * Errors: 403 when purging is disabled, 404 unknown user, 409 purge already
 * running for this user, 500 rolled back.
 */
pub async fn legacy_user_delete(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<PurgeSummary> {
    if !state.purge.enabled {
        return Err(ApiError::forbidden("Legacy user deletion is disabled"));
    }

    let summary = state.purger.delete_legacy_user(user_id).await?;
    Ok(ApiResponse::success(summary))
}

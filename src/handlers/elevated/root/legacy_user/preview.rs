// handlers/elevated/root/legacy_user/preview.rs - GET /api/root/legacy-user/:id/preview handler

use axum::extract::{Path, State};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::purge::PurgeSummary;

/// Report what deleting the user would remove without changing anything.
/// Same response shape as the delete, with `dry_run: true`.
pub async fn legacy_user_preview(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<PurgeSummary> {
    if !state.purge.enabled {
        return Err(ApiError::forbidden("Legacy user deletion is disabled"));
    }
    if !state.purge.allow_preview {
        return Err(ApiError::forbidden("Purge preview is disabled in this environment"));
    }

    let summary = state.purger.preview_legacy_user(user_id).await?;
    Ok(ApiResponse::success(summary))
}

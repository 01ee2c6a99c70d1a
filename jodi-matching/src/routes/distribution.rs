use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use jodi_shared::errors::{AppError, AppResult, ErrorCode};
use jodi_shared::middleware::AdminUser;
use jodi_shared::types::ApiResponse;

use crate::services::distributor::{self, DistributionReport};
use crate::AppState;

// --- POST /internal/distribute ---

/// Manually triggers a distribution run. At most one run at a time; a
/// request while the periodic task holds the lock is rejected.
pub async fn trigger_distribution(
    _admin: AdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<DistributionReport>>> {
    let guard = state.distribution_lock.try_lock().map_err(|_| {
        AppError::new(
            ErrorCode::BadRequest,
            "a distribution run is already in progress",
        )
    })?;

    let report = distributor::distribute_all(
        &state.db,
        state.notifier.as_ref(),
        state.documents.as_ref(),
        &state.rabbitmq,
        &state.config,
    )
    .await?;

    drop(guard);
    Ok(Json(ApiResponse::ok(report)))
}

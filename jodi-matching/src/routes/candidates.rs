use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use jodi_shared::errors::AppResult;
use jodi_shared::types::auth::AuthUser;
use jodi_shared::types::pagination::{PageParams, Paged};
use jodi_shared::types::ApiResponse;

use crate::models::Profile;
use crate::services::candidate_finder;
use crate::AppState;

// --- GET /profiles/:id/candidates ---

pub async fn find_candidates(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<ApiResponse<Paged<Profile>>>> {
    let candidates = candidate_finder::find_candidates(&state.db, profile_id, page)?;
    Ok(Json(ApiResponse::ok(candidates)))
}

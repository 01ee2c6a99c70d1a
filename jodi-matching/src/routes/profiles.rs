use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use jodi_shared::errors::AppResult;
use jodi_shared::middleware::AgentUser;
use jodi_shared::types::auth::AuthUser;
use jodi_shared::types::event::payloads::RecomputeKind;
use jodi_shared::types::pagination::{PageParams, Paged};
use jodi_shared::types::ApiResponse;

use crate::events::publisher;
use crate::models::Profile;
use crate::services::profile_service::{self, CreateProfileRequest};
use crate::AppState;

// --- POST /profiles ---

pub async fn create_profile(
    _agent: AgentUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProfileRequest>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let profile = profile_service::create_profile(&state.db, payload)?;

    // Creation is not complete until the recompute job is queued.
    publisher::enqueue_recompute(
        &state.rabbitmq,
        profile.id,
        RecomputeKind::Create,
        state.config.recompute_delay_ms,
    )
    .await?;
    publisher::publish_profile_created(&state.rabbitmq, profile.id).await;

    Ok(Json(ApiResponse::ok(profile)))
}

// --- GET /profiles/:id ---

pub async fn get_profile(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let profile = profile_service::get_profile(&state.db, profile_id)?;
    Ok(Json(ApiResponse::ok(profile)))
}

// --- GET /profiles ---

pub async fn list_profiles(
    _agent: AgentUser,
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<ApiResponse<Paged<Profile>>>> {
    let profiles = profile_service::list_profiles(&state.db, page)?;
    Ok(Json(ApiResponse::ok(profiles)))
}

// --- POST /profiles/:id/deactivate ---

pub async fn deactivate_profile(
    _agent: AgentUser,
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let profile = profile_service::deactivate_profile(&state.db, profile_id)?;
    publisher::publish_profile_deactivated(&state.rabbitmq, profile.id).await;
    Ok(Json(ApiResponse::ok(profile)))
}

// --- POST /profiles/:id/reactivate ---

pub async fn reactivate_profile(
    _agent: AgentUser,
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let profile = profile_service::reactivate_profile(&state.db, profile_id)?;

    // A reactivated profile needs its pairings rebuilt.
    publisher::enqueue_recompute(
        &state.rabbitmq,
        profile.id,
        RecomputeKind::Update,
        state.config.recompute_delay_ms,
    )
    .await?;

    Ok(Json(ApiResponse::ok(profile)))
}

use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use jodi_shared::errors::AppResult;
use jodi_shared::middleware::AgentUser;
use jodi_shared::types::auth::AuthUser;
use jodi_shared::types::ApiResponse;

use crate::models::PartnerPreference;
use crate::services::preference_service::{self, PreferenceInput};
use crate::AppState;

// --- PUT /profiles/:id/preference ---

pub async fn save_preference(
    _agent: AgentUser,
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
    Json(payload): Json<PreferenceInput>,
) -> AppResult<Json<ApiResponse<PartnerPreference>>> {
    let saved = preference_service::save_preference(
        &state.db,
        &state.rabbitmq,
        &state.config,
        profile_id,
        payload,
    )
    .await?;
    Ok(Json(ApiResponse::ok(saved)))
}

// --- GET /profiles/:id/preference ---

pub async fn get_preference(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Option<PartnerPreference>>>> {
    let preference = preference_service::get_preference(&state.db, profile_id)?;
    Ok(Json(ApiResponse::ok(preference)))
}

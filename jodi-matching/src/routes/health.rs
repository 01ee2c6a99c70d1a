use axum::Json;
use jodi_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("jodi-matching", env!("CARGO_PKG_VERSION")))
}

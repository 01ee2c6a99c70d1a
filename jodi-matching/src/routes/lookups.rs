use axum::extract::{Query, State};
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use jodi_shared::errors::{AppError, AppResult};
use jodi_shared::types::auth::AuthUser;
use jodi_shared::types::pagination::{PageParams, Paged};
use jodi_shared::types::ApiResponse;

use crate::models::{Caste, City, Religion};
use crate::schema::{castes, cities};
use crate::AppState;

fn default_take() -> i64 {
    20
}

// serde_urlencoded cannot flatten numeric fields, so the page window is
// inlined instead of embedding PageParams.
#[derive(Debug, Deserialize)]
pub struct CasteQuery {
    pub religion: Option<Religion>,
    pub like: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_take")]
    pub take: i64,
}

fn like_pattern(like: &str) -> String {
    format!("%{}%", like.replace('%', "\\%"))
}

// --- GET /castes ---

pub async fn list_castes(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CasteQuery>,
) -> AppResult<Json<ApiResponse<Paged<Caste>>>> {
    let page = PageParams::new(query.skip, query.take);
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let mut count_query = castes::table.count().into_boxed();
    let mut page_query = castes::table.into_boxed();

    if let Some(religion) = query.religion {
        count_query = count_query.filter(castes::religion.eq(religion));
        page_query = page_query.filter(castes::religion.eq(religion));
    }
    if let Some(like) = &query.like {
        count_query = count_query.filter(castes::name.ilike(like_pattern(like)));
        page_query = page_query.filter(castes::name.ilike(like_pattern(like)));
    }

    let total: i64 = count_query.get_result(&mut conn)?;
    let items = page_query
        .order(castes::name.asc())
        .offset(page.skip)
        .limit(page.take)
        .load::<Caste>(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paged::new(items, total))))
}

#[derive(Debug, Deserialize)]
pub struct CityQuery {
    pub like: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_take")]
    pub take: i64,
}

// --- GET /cities ---

pub async fn list_cities(
    _user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CityQuery>,
) -> AppResult<Json<ApiResponse<Paged<City>>>> {
    let page = PageParams::new(query.skip, query.take);
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let mut count_query = cities::table.count().into_boxed();
    let mut page_query = cities::table.into_boxed();

    if let Some(like) = &query.like {
        count_query = count_query.filter(cities::name.ilike(like_pattern(like)));
        page_query = page_query.filter(cities::name.ilike(like_pattern(like)));
    }

    let total: i64 = count_query.get_result(&mut conn)?;
    let items = page_query
        .order(cities::name.asc())
        .offset(page.skip)
        .limit(page.take)
        .load::<City>(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paged::new(items, total))))
}

//! Creator API endpoints
//!
//! - GET /api/v1/creators/top - Home page creators
//! - GET /api/v1/creators/{external_id} - Public teacher profile

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::Creator;

/// Build the creators router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/top", get(top_creators))
        .route("/{external_id}", get(get_creator))
}

/// GET /api/v1/creators/top
async fn top_creators(State(state): State<AppState>) -> Result<Json<Vec<Creator>>, ApiError> {
    let creators = state.user_service.top_creators().await?;
    Ok(Json(creators))
}

/// GET /api/v1/creators/{external_id}
async fn get_creator(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<Creator>, ApiError> {
    state
        .user_service
        .get_creator_by_id(&external_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found."))
}

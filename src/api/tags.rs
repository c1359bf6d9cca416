//! Tag API endpoints
//!
//! - GET /api/v1/tags - Catalogue tags, used by the course form

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::Tag;

/// Response for tag list
#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<Tag>,
}

/// Build the tags router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_tags))
}

/// GET /api/v1/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<TagListResponse>, ApiError> {
    let tags = state.tag_service.list().await?;
    Ok(Json(TagListResponse { tags }))
}

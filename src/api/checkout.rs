//! Checkout API endpoints
//!
//! - POST /api/v1/checkout/sessions - Start a course purchase
//! - GET /api/v1/checkout/sessions/{session} - Confirm a returning buyer

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    Json,
};
use serde::Deserialize;

use crate::api::common::WithRedirect;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::services::{CheckoutOutcome, CreatedCheckout};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[serde(alias = "course_id")]
    pub course_id: i64,
}

/// POST /api/v1/checkout/sessions
///
/// Return links point at the requesting storefront, falling back to the
/// configured public origin.
pub async fn create_session(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    Json(body): Json<CreateCheckoutRequest>,
) -> Result<Json<CreatedCheckout>, ApiError> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && *v != "null")
        .unwrap_or(state.public_origin.as_str());

    let created = state
        .checkout_service
        .create_checkout_session(user.as_ref(), body.course_id, origin)
        .await?;
    Ok(Json(created))
}

/// GET /api/v1/checkout/sessions/{session}
///
/// Enrolls the buyer if the session is paid and sends them to the first
/// lesson.
pub async fn confirm_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<String>,
) -> Result<Json<WithRedirect<CheckoutOutcome>>, ApiError> {
    let outcome = state
        .checkout_service
        .retrieve_checkout_session(&user.0, &session_id)
        .await?;

    let redirect = match &outcome.first_lesson_slug {
        Some(lesson) => format!("/courses/{}/lessons/{}", outcome.course_slug, lesson),
        None => format!("/courses/{}", outcome.course_slug),
    };
    Ok(Json(WithRedirect::to(outcome, redirect)))
}

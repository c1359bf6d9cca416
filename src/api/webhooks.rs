//! Provider webhooks
//!
//! - POST /api/v1/webhooks/video - Video asset lifecycle events
//! - POST /api/v1/webhooks/payments - Payment events
//!
//! Both read the raw body, since signatures cover the exact bytes sent.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};

pub const VIDEO_SIGNATURE_HEADER: &str = "mux-signature";
pub const PAYMENTS_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Build the webhooks router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/video", post(video_webhook))
        .route("/payments", post(payments_webhook))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn video_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let outcome = state
        .video_service
        .handle_webhook(header(&headers, VIDEO_SIGNATURE_HEADER), &body)
        .await?;
    tracing::debug!("Video webhook handled: {:?}", outcome);
    Ok(Json(WebhookAck { received: true }))
}

async fn payments_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    state
        .checkout_service
        .handle_webhook(header(&headers, PAYMENTS_SIGNATURE_HEADER), &body)
        .await?;
    Ok(Json(WebhookAck { received: true }))
}

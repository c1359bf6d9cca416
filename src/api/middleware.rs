//! API middleware
//!
//! Contains:
//! - Shared application state
//! - Session authentication against the identity provider's tokens
//! - The JSON error type every handler returns

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;

use crate::models::User;
use crate::providers::IdentityVerifier;
use crate::services::{
    CheckoutService, CourseService, LessonService, TagService, UserService, VideoService,
};

/// Cookie the storefront stores the session token in
pub const SESSION_COOKIE: &str = "__session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityVerifier>,
    pub user_service: Arc<UserService>,
    pub tag_service: Arc<TagService>,
    pub course_service: Arc<CourseService>,
    pub lesson_service: Arc<LessonService>,
    pub video_service: Arc<VideoService>,
    pub checkout_service: Arc<CheckoutService>,
    /// Storefront base URL used for checkout return links when the request
    /// carries no `Origin`
    pub public_origin: String,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The signed-in user, if any. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

/// Error response for API errors: `{"error": "<message>"}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// A failed operation whose message is safe to show. The full error
    /// chain goes to the log.
    pub fn failure(err: &(dyn std::error::Error + 'static)) -> Self {
        tracing::error!("{}", error_chain(err));
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }

    /// An unexpected failure. Details are logged, never returned.
    pub fn internal(err: &(dyn std::error::Error + 'static)) -> Self {
        tracing::error!("{}", error_chain(err));
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Extract session token from request
fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Verify the session token and mirror the user locally
async fn resolve_user(state: &AppState, token: Option<String>) -> Result<Option<User>, ApiError> {
    let Some(token) = token else {
        return Ok(None);
    };

    let claims = match state.identity.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("Rejected session token: {}", e);
            return Ok(None);
        }
    };

    let user = state
        .user_service
        .ensure_user(&claims.into_user_input())
        .await
        .map_err(|e| ApiError::internal(&e))?;
    Ok(Some(user))
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&request);
    let user = resolve_user(&state, token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(&request);
    match resolve_user(&state, token).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
        Ok(None) => {}
        Err(e) => return e.into_response(),
    }
    next.run(request).await
}

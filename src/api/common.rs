//! Common API utilities and shared types
//!
//! Service error mapping and the redirect envelope returned by actions
//! that move the storefront to another page.

use serde::Serialize;

use crate::api::middleware::ApiError;
use crate::services::{
    CheckoutServiceError, CourseServiceError, LessonServiceError, TagServiceError,
    UserServiceError, VideoServiceError,
};

// ============================================================================
// Responses
// ============================================================================

/// Action result with the page the client should navigate to
#[derive(Debug, Serialize)]
pub struct WithRedirect<T: Serialize> {
    #[serde(flatten)]
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl<T: Serialize> WithRedirect<T> {
    pub fn to(data: T, redirect: impl Into<String>) -> Self {
        Self {
            data,
            redirect: Some(redirect.into()),
        }
    }
}

/// Empty success payload
#[derive(Debug, Serialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub fn new() -> Self {
        Self { success: true }
    }
}

impl Default for Success {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Error mapping
// ============================================================================

impl From<CourseServiceError> for ApiError {
    fn from(e: CourseServiceError) -> Self {
        use CourseServiceError::*;
        match e {
            Unauthorized => ApiError::unauthorized(e.to_string()),
            NotFound => ApiError::not_found(e.to_string()),
            ValidationError | NoPublishedLessons | HasStudents => {
                ApiError::validation_error(e.to_string())
            }
            DuplicateSlug => ApiError::conflict(e.to_string()),
            CreateFailed(_) | UpdateFailed(_) | DeleteFailed(_) => ApiError::failure(&e),
            InternalError(_) => ApiError::internal(&e),
        }
    }
}

impl From<LessonServiceError> for ApiError {
    fn from(e: LessonServiceError) -> Self {
        use LessonServiceError::*;
        match e {
            Unauthorized | EnrollmentRequired => ApiError::unauthorized(e.to_string()),
            NotFound => ApiError::not_found(e.to_string()),
            ValidationError | NoVideo | VideoProcessing => ApiError::validation_error(e.to_string()),
            DuplicateSlug => ApiError::conflict(e.to_string()),
            CreateFailed(_) | UpdateFailed(_) | DeleteFailed(_) | UploadFailed(_) => {
                ApiError::failure(&e)
            }
            InternalError(_) => ApiError::internal(&e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        use UserServiceError::*;
        match e {
            Unauthorized => ApiError::unauthorized(e.to_string()),
            NotFound => ApiError::not_found(e.to_string()),
            ValidationError => ApiError::validation_error(e.to_string()),
            UpdateFailed(_) => ApiError::failure(&e),
            InternalError(_) => ApiError::internal(&e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::EmptyName => ApiError::validation_error(e.to_string()),
            TagServiceError::InternalError(_) => ApiError::internal(&e),
        }
    }
}

impl From<VideoServiceError> for ApiError {
    fn from(e: VideoServiceError) -> Self {
        use VideoServiceError::*;
        match e {
            InvalidSignature(_) | InvalidPayload(_) | VideoNotFound => {
                ApiError::validation_error(e.to_string())
            }
            NotConfigured | InternalError(_) => ApiError::internal(&e),
        }
    }
}

impl From<CheckoutServiceError> for ApiError {
    fn from(e: CheckoutServiceError) -> Self {
        use CheckoutServiceError::*;
        match e {
            Unauthorized | SignInRequired => ApiError::unauthorized(e.to_string()),
            CourseUnavailable | UserNotFound | CourseNotFound | NotEnrolled | RefundsDisabled => {
                ApiError::not_found(e.to_string())
            }
            AlreadyEnrolled => ApiError::conflict(e.to_string()),
            MissingSessionId | InvalidSession | NotPaid | InvalidSignature(_) | InvalidPayload(_) => {
                ApiError::validation_error(e.to_string())
            }
            CreateFailed(_) | RetrieveFailed(_) => ApiError::failure(&e),
            WebhookNotConfigured | InternalError(_) => ApiError::internal(&e),
        }
    }
}

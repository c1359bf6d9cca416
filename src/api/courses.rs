//! Course API endpoints
//!
//! Public catalogue:
//! - GET /api/v1/courses - Published courses, newest first
//! - GET /api/v1/courses/{course} - Course page with its published lessons
//! - GET /api/v1/courses/{course}/lessons/{lesson} - Lesson player data
//!
//! Signed in:
//! - GET /api/v1/me - Current user with enrolled course ids
//! - GET /api/v1/learn/courses - Courses the user is enrolled in
//! - POST /api/v1/courses/{course}/refund - Development-only refund

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::Success;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{CourseDetail, CourseSummary, LessonWithVideo, UserWithEnrollments};

/// Query parameters for the catalogue
#[derive(Debug, Deserialize)]
pub struct ListCoursesQuery {
    /// Newest N courses; all when absent or not positive
    pub limit: Option<i64>,
}

/// Public routes (optional authentication)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses))
        .route("/courses/{course}", get(get_course))
        .route("/courses/{course}/lessons/{lesson}", get(get_lesson))
}

/// Routes that need a signed-in user
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/learn/courses", get(my_courses))
        .route("/courses/{course}/refund", post(refund_course))
}

/// GET /api/v1/courses
async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Json<Vec<CourseSummary>>, ApiError> {
    let courses = state.course_service.list_published(query.limit).await?;
    Ok(Json(courses))
}

/// GET /api/v1/courses/{course}
async fn get_course(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CourseDetail>, ApiError> {
    state
        .course_service
        .get_by_slug(&slug, false)
        .await?
        .filter(|detail| detail.course().is_published)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Course not found."))
}

/// GET /api/v1/courses/{course}/lessons/{lesson}
async fn get_lesson(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path((course_slug, lesson_slug)): Path<(String, String)>,
) -> Result<Json<LessonWithVideo>, ApiError> {
    let lesson = state
        .lesson_service
        .get_for_learner(viewer.as_ref(), &course_slug, &lesson_slug)
        .await?;
    Ok(Json(lesson))
}

/// GET /api/v1/me
async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserWithEnrollments>, ApiError> {
    let user = state.user_service.get_user(&user.0.external_id).await?;
    Ok(Json(user))
}

/// GET /api/v1/learn/courses
async fn my_courses(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<CourseDetail>>, ApiError> {
    let courses = state
        .course_service
        .list_for_student(&user.0.external_id)
        .await?;
    Ok(Json(courses))
}

/// POST /api/v1/courses/{course}/refund
async fn refund_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<i64>,
) -> Result<Json<Success>, ApiError> {
    state.checkout_service.refund_course(&user.0, course_id).await?;
    Ok(Json(Success::new()))
}

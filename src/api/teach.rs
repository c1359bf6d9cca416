//! Teacher API endpoints
//!
//! All routes require a session; ownership is checked by the services.
//!
//! Courses:
//! - GET /api/v1/teach/courses - The caller's courses
//! - POST /api/v1/teach/courses - Create a course
//! - GET /api/v1/teach/courses/{course} - Course editor data (by slug)
//! - PUT /api/v1/teach/courses/{course} - Update a course (by id)
//! - DELETE /api/v1/teach/courses/{course} - Delete a course (by id)
//!
//! Lessons:
//! - POST /api/v1/teach/courses/{course}/lessons - Create a lesson
//! - GET /api/v1/teach/courses/{course}/lessons/{lesson} - Lesson editor data
//! - PUT /api/v1/teach/lessons/{lesson} - Update a lesson
//! - DELETE /api/v1/teach/lessons/{lesson} - Delete a lesson
//! - POST /api/v1/teach/lessons/{lesson}/upload - Direct-upload URL
//! - GET /api/v1/teach/lessons/{lesson}/video - Video processing status
//!
//! Profile:
//! - GET /api/v1/teach/profile - The caller's public profile
//! - PUT /api/v1/teach/profile/{external_id} - Update the profile

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{Success, WithRedirect};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    Course, CourseDetail, CourseSummary, CreateCourseInput, CreateLessonInput, Creator, Lesson,
    LessonWithVideo, ProfileInput, UpdateCourseInput, UpdateLessonInput, Video,
};
use crate::services::course::{teach_course_path, TEACH_COURSES_PATH};

/// Query parameters for lesson deletion
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLessonQuery {
    /// Local page to return to afterwards
    pub redirect_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct VideoStatusResponse {
    pub video: Option<Video>,
}

/// Build the teacher router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/{course}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/courses/{course}/lessons", post(create_lesson))
        .route("/courses/{course}/lessons/{lesson}", get(get_lesson))
        .route("/lessons/{lesson}", put(update_lesson).delete(delete_lesson))
        .route("/lessons/{lesson}/upload", post(create_upload_url))
        .route("/lessons/{lesson}/video", get(video_status))
        .route("/profile", get(get_profile))
        .route("/profile/{external_id}", put(update_profile))
}

// ============================================================================
// Courses
// ============================================================================

async fn list_courses(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<CourseSummary>>, ApiError> {
    let courses = state.course_service.list_by_teacher(&user.0).await?;
    Ok(Json(courses))
}

async fn create_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateCourseInput>,
) -> Result<(StatusCode, Json<WithRedirect<Course>>), ApiError> {
    let course = state.course_service.create(&user.0, &body).await?;
    let redirect = teach_course_path(&course.slug);
    Ok((StatusCode::CREATED, Json(WithRedirect::to(course, redirect))))
}

async fn get_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(slug): Path<String>,
) -> Result<Json<CourseDetail>, ApiError> {
    let detail = state.course_service.get_for_teacher(&user.0, &slug).await?;
    Ok(Json(detail))
}

async fn update_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<i64>,
    Json(body): Json<UpdateCourseInput>,
) -> Result<Json<Course>, ApiError> {
    let course = state
        .course_service
        .update(&user.0, course_id, &body)
        .await?;
    Ok(Json(course))
}

async fn delete_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<i64>,
) -> Result<Json<WithRedirect<Success>>, ApiError> {
    state.course_service.delete(&user.0, course_id).await?;
    Ok(Json(WithRedirect::to(Success::new(), TEACH_COURSES_PATH)))
}

// ============================================================================
// Lessons
// ============================================================================

async fn create_lesson(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_slug): Path<String>,
    Json(body): Json<CreateLessonInput>,
) -> Result<(StatusCode, Json<WithRedirect<Lesson>>), ApiError> {
    let lesson = state
        .lesson_service
        .create(&user.0, &course_slug, &body)
        .await?;
    let redirect = format!("{}/lessons/{}", teach_course_path(&course_slug), lesson.slug);
    Ok((StatusCode::CREATED, Json(WithRedirect::to(lesson, redirect))))
}

async fn get_lesson(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((course_slug, lesson_slug)): Path<(String, String)>,
) -> Result<Json<LessonWithVideo>, ApiError> {
    let lesson = state
        .lesson_service
        .get_for_teacher(&user.0, &course_slug, &lesson_slug)
        .await?;
    Ok(Json(lesson))
}

async fn update_lesson(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(lesson_id): Path<i64>,
    Json(body): Json<UpdateLessonInput>,
) -> Result<Json<Lesson>, ApiError> {
    let lesson = state
        .lesson_service
        .update(&user.0, lesson_id, &body)
        .await?;
    Ok(Json(lesson))
}

async fn delete_lesson(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(lesson_id): Path<i64>,
    Query(query): Query<DeleteLessonQuery>,
) -> Result<Json<WithRedirect<Success>>, ApiError> {
    let redirect = state
        .lesson_service
        .delete(&user.0, lesson_id, query.redirect_to.as_deref())
        .await?;
    Ok(Json(WithRedirect {
        data: Success::new(),
        redirect,
    }))
}

async fn create_upload_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(lesson_id): Path<i64>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let url = state
        .lesson_service
        .create_upload_url(&user.0, lesson_id)
        .await?;
    Ok(Json(UploadUrlResponse { url }))
}

async fn video_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(lesson_id): Path<i64>,
) -> Result<Json<VideoStatusResponse>, ApiError> {
    let video = state.lesson_service.video_status(&user.0, lesson_id).await?;
    Ok(Json(VideoStatusResponse { video }))
}

// ============================================================================
// Profile
// ============================================================================

async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Creator>, ApiError> {
    state
        .user_service
        .get_creator_by_id(&user.0.external_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found."))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(external_id): Path<String>,
    Json(body): Json<ProfileInput>,
) -> Result<Json<Success>, ApiError> {
    state
        .user_service
        .update_teacher_profile(&user.0, &external_id, &body)
        .await?;
    Ok(Json(Success::new()))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use crate::models::VideoStatus;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_teach_routes_require_session() {
        let app = TestApp::new().await;
        let (status, _) = app.get("/api/v1/teach/courses", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_course_flow() {
        let app = TestApp::new().await;
        let tag = app.env.tag("Development").await;
        let token = app.token("teacher");

        let body = json!({
            "name": "Rust for Beginners",
            "slug": "rust-for-beginners",
            "description": "Learn Rust from scratch",
            "price": 30,
            "tagId": tag.id,
        });
        let (status, created) = app
            .send(Method::POST, "/api/v1/teach/courses", Some(&token), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["redirect"], "/teach/courses/rust-for-beginners");
        assert_eq!(created["is_published"], json!(false));

        let (status, err) = app
            .send(Method::POST, "/api/v1/teach/courses", Some(&token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"], "A course with that slug already exists.");

        let (status, list) = app.get("/api/v1/teach/courses", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, detail) = app
            .get("/api/v1/teach/courses/rust-for-beginners", Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["slug"], "rust-for-beginners");

        let other = app.token("someone-else");
        let (status, _) = app
            .get("/api/v1/teach/courses/rust-for-beginners", Some(&other))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_course_is_rejected() {
        let app = TestApp::new().await;
        let tag = app.env.tag("Development").await;
        let token = app.token("teacher");

        let body = json!({
            "name": "Ru",
            "slug": "Not A Slug",
            "description": "Learn Rust from scratch",
            "price": 0,
            "tagId": tag.id,
        });
        let (status, err) = app
            .send(Method::POST, "/api/v1/teach/courses", Some(&token), Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "Form validation error.");
    }

    #[tokio::test]
    async fn test_publish_requires_published_lesson() {
        let app = TestApp::new().await;
        let teacher = app.env.user("teacher").await;
        let tag = app.env.tag("Development").await;
        let course = app.env.course(&teacher, &tag, "empty-course").await;
        let token = app.token("teacher");

        let path = format!("/api/v1/teach/courses/{}", course.id);
        let (status, err) = app
            .send(Method::PUT, &path, Some(&token), Some(json!({"isPublished": true})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            err["error"],
            "Please publish at least one lesson before publishing the course."
        );
    }

    #[tokio::test]
    async fn test_lesson_lifecycle() {
        let app = TestApp::new().await;
        let teacher = app.env.user("teacher").await;
        let tag = app.env.tag("Development").await;
        app.env.course(&teacher, &tag, "lifecycle").await;
        let token = app.token("teacher");

        let (status, created) = app
            .send(
                Method::POST,
                "/api/v1/teach/courses/lifecycle/lessons",
                Some(&token),
                Some(json!({"name": "Introduction", "slug": "introduction"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["redirect"], "/teach/courses/lifecycle/lessons/introduction");
        let lesson_id = created["id"].as_i64().unwrap();

        // publishing before any upload
        let path = format!("/api/v1/teach/lessons/{}", lesson_id);
        let (status, err) = app
            .send(Method::PUT, &path, Some(&token), Some(json!({"isPublished": true})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "Upload a video to publish this lesson.");

        let upload_path = format!("/api/v1/teach/lessons/{}/upload", lesson_id);
        let (status, upload) = app.send(Method::POST, &upload_path, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(upload["url"].as_str().unwrap().starts_with("https://storage.example.com/"));

        let video_path = format!("/api/v1/teach/lessons/{}/video", lesson_id);
        let (status, video) = app.get(&video_path, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(video["video"]["status"], "waiting");

        let delete_path = format!(
            "/api/v1/teach/lessons/{}?redirectTo=/teach/courses/lifecycle",
            lesson_id
        );
        let (status, deleted) = app.send(Method::DELETE, &delete_path, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["redirect"], "/teach/courses/lifecycle");
    }

    #[tokio::test]
    async fn test_publish_lesson_with_ready_video() {
        let app = TestApp::new().await;
        let teacher = app.env.user("teacher").await;
        let tag = app.env.tag("Development").await;
        let course = app.env.course(&teacher, &tag, "ready-course").await;
        let lesson = app.env.lesson(&course, "ready-lesson").await;
        app.env.video(&lesson, &teacher, VideoStatus::Ready).await;
        let token = app.token("teacher");

        let path = format!("/api/v1/teach/lessons/{}", lesson.id);
        let (status, updated) = app
            .send(Method::PUT, &path, Some(&token), Some(json!({"isPublished": true})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["is_published"], json!(true));
    }

    #[tokio::test]
    async fn test_update_profile_only_own() {
        let app = TestApp::new().await;
        let token = app.token("teacher");

        let (status, _) = app
            .send(
                Method::PUT,
                "/api/v1/teach/profile/somebody",
                Some(&token),
                Some(json!({"bio": "hijack"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(
                Method::PUT,
                "/api/v1/teach/profile/teacher",
                Some(&token),
                Some(json!({"bio": "Rustacean"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, profile) = app.get("/api/v1/teach/profile", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["bio"], "Rustacean");
    }
}

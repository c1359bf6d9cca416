//! Course service
//!
//! Catalogue reads (cached) and the teacher's course actions. A course is
//! only ever visible to its teacher until published, and it cannot be
//! published without at least one published lesson.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{
    CourseFilter, CourseRepository, EnrollmentRepository, LessonRepository, TagRepository,
    UserRepository, VideoRepository,
};
use crate::models::{Course, CourseDetail, CourseSummary, CreateCourseInput, UpdateCourseInput, User};
use crate::providers::VideoProvider;
use crate::services::user::CACHE_PREFIX_CREATOR;
use crate::services::{generate_slug, long_enough};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

const CACHE_KEY_COURSE_LIST: &str = "course:published:";
const CACHE_KEY_COURSE_BY_SLUG: &str = "course:slug:";
pub(crate) const CACHE_PREFIX_COURSE: &str = "course:";

/// Where the teacher lands after creating a course
pub fn teach_course_path(slug: &str) -> String {
    format!("/teach/courses/{}", slug)
}

/// Where the teacher lands after deleting a course
pub const TEACH_COURSES_PATH: &str = "/teach/courses";

/// Error types for course service operations
#[derive(Debug, thiserror::Error)]
pub enum CourseServiceError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Course not found.")]
    NotFound,

    #[error("Form validation error.")]
    ValidationError,

    #[error("A course with that slug already exists.")]
    DuplicateSlug,

    #[error("Failed to create the course.")]
    CreateFailed(#[source] anyhow::Error),

    #[error("Please publish at least one lesson before publishing the course.")]
    NoPublishedLessons,

    #[error("Failed to update the course.")]
    UpdateFailed(#[source] anyhow::Error),

    #[error("Cannot delete a course with enrolled students.")]
    HasStudents,

    #[error("Failed to delete the course.")]
    DeleteFailed(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Course service
pub struct CourseService {
    courses: Arc<dyn CourseRepository>,
    lessons: Arc<dyn LessonRepository>,
    videos: Arc<dyn VideoRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    tags: Arc<dyn TagRepository>,
    users: Arc<dyn UserRepository>,
    video_provider: Arc<dyn VideoProvider>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CourseService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        courses: Arc<dyn CourseRepository>,
        lessons: Arc<dyn LessonRepository>,
        videos: Arc<dyn VideoRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        tags: Arc<dyn TagRepository>,
        users: Arc<dyn UserRepository>,
        video_provider: Arc<dyn VideoProvider>,
        cache: Arc<Cache>,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            courses,
            lessons,
            videos,
            enrollments,
            tags,
            users,
            video_provider,
            cache,
            cache_ttl,
        }
    }

    // ========================================================================
    // Catalogue
    // ========================================================================

    /// Published courses with teacher and tag, newest first
    pub async fn list_published(&self, limit: Option<i64>) -> Result<Vec<CourseSummary>, CourseServiceError> {
        let limit = limit.filter(|l| *l > 0);
        let cache_key = match limit {
            Some(limit) => format!("{}{}", CACHE_KEY_COURSE_LIST, limit),
            None => format!("{}all", CACHE_KEY_COURSE_LIST),
        };
        if let Some(courses) = self
            .cache
            .get::<Vec<CourseSummary>>(&cache_key)
            .await
            .ok()
            .flatten()
        {
            return Ok(courses);
        }

        let courses = self
            .courses
            .list(CourseFilter::Published, limit)
            .await
            .context("Failed to list published courses")?;

        let _ = self.cache.set(&cache_key, &courses, self.cache_ttl).await;
        Ok(courses)
    }

    /// Course page data. The teacher view includes unpublished lessons;
    /// only the public view is cached.
    pub async fn get_by_slug(
        &self,
        slug: &str,
        teacher_view: bool,
    ) -> Result<Option<CourseDetail>, CourseServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_COURSE_BY_SLUG, slug);
        if !teacher_view {
            if let Some(detail) = self.cache.get::<CourseDetail>(&cache_key).await.ok().flatten() {
                return Ok(Some(detail));
            }
        }

        let Some(summary) = self
            .courses
            .get_summary_by_slug(slug)
            .await
            .context("Failed to get course by slug")?
        else {
            return Ok(None);
        };
        let lessons = self
            .lessons
            .list_by_course(summary.course.id, !teacher_view)
            .await
            .context("Failed to list lessons")?;

        let detail = CourseDetail { summary, lessons };
        if !teacher_view {
            let _ = self.cache.set(&cache_key, &detail, self.cache_ttl).await;
        }
        Ok(Some(detail))
    }

    /// Teacher view of one of the caller's own courses
    pub async fn get_for_teacher(&self, teacher: &User, slug: &str) -> Result<CourseDetail, CourseServiceError> {
        match self.get_by_slug(slug, true).await? {
            Some(detail) if detail.course().teacher_id == teacher.id => Ok(detail),
            _ => Err(CourseServiceError::Unauthorized),
        }
    }

    /// Every course the teacher owns, newest first
    pub async fn list_by_teacher(&self, teacher: &User) -> Result<Vec<CourseSummary>, CourseServiceError> {
        self.courses
            .list(CourseFilter::Teacher(teacher.id), None)
            .await
            .context("Failed to list teacher courses")
            .map_err(Into::into)
    }

    /// Courses the user is enrolled in, each with its published lessons
    pub async fn list_for_student(&self, external_id: &str) -> Result<Vec<CourseDetail>, CourseServiceError> {
        let Some(user) = self
            .users
            .get_by_external_id(external_id)
            .await
            .context("Failed to get user")?
        else {
            return Ok(Vec::new());
        };

        let summaries = self
            .courses
            .list(CourseFilter::EnrolledBy(user.id), None)
            .await
            .context("Failed to list enrolled courses")?;

        let mut courses = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let lessons = self
                .lessons
                .list_by_course(summary.course.id, true)
                .await
                .context("Failed to list lessons")?;
            courses.push(CourseDetail { summary, lessons });
        }
        Ok(courses)
    }

    // ========================================================================
    // Teacher actions
    // ========================================================================

    /// Create an unpublished course owned by `teacher`.
    pub async fn create(&self, teacher: &User, input: &CreateCourseInput) -> Result<Course, CourseServiceError> {
        let input = CreateCourseInput {
            name: input.name.trim().to_string(),
            slug: input.slug.trim().to_string(),
            description: input.description.trim().to_string(),
            ..input.clone()
        };
        self.validate_create(&input).await?;

        let course = Course::new(teacher.id, &input);
        let created = match self.courses.create(&course).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => return Err(CourseServiceError::DuplicateSlug),
            Err(e) => return Err(CourseServiceError::CreateFailed(e)),
        };

        tracing::info!("Course '{}' created by user {}", created.slug, teacher.id);
        self.invalidate().await;
        Ok(created)
    }

    /// Apply a partial update to one of the teacher's courses.
    pub async fn update(
        &self,
        teacher: &User,
        course_id: i64,
        input: &UpdateCourseInput,
    ) -> Result<Course, CourseServiceError> {
        let mut course = self.owned_course(teacher, course_id).await?;
        self.validate_update(input).await?;

        if input.is_published == Some(true) {
            let published = self
                .lessons
                .count_published(course.id)
                .await
                .map_err(CourseServiceError::UpdateFailed)?;
            if published == 0 {
                return Err(CourseServiceError::NoPublishedLessons);
            }
        }

        course.apply(input);
        let updated = self
            .courses
            .update(&course)
            .await
            .map_err(CourseServiceError::UpdateFailed)?;

        self.invalidate().await;
        Ok(updated)
    }

    /// Delete one of the teacher's courses together with its lesson videos
    /// at the video platform. Refused while students are enrolled.
    pub async fn delete(&self, teacher: &User, course_id: i64) -> Result<(), CourseServiceError> {
        let course = self.owned_course(teacher, course_id).await?;

        let students = self
            .enrollments
            .count_for_course(course.id)
            .await
            .map_err(CourseServiceError::DeleteFailed)?;
        if students > 0 {
            return Err(CourseServiceError::HasStudents);
        }

        let asset_ids = self
            .videos
            .asset_ids_for_course(course.id)
            .await
            .map_err(CourseServiceError::DeleteFailed)?;
        for asset_id in &asset_ids {
            self.video_provider
                .delete_asset(asset_id)
                .await
                .map_err(CourseServiceError::DeleteFailed)?;
        }

        self.courses
            .delete(course.id)
            .await
            .map_err(CourseServiceError::DeleteFailed)?;

        tracing::info!(
            "Course '{}' deleted with {} video assets",
            course.slug,
            asset_ids.len()
        );
        self.invalidate().await;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn owned_course(&self, teacher: &User, course_id: i64) -> Result<Course, CourseServiceError> {
        match self
            .courses
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
        {
            Some(course) if course.teacher_id == teacher.id => Ok(course),
            _ => Err(CourseServiceError::Unauthorized),
        }
    }

    async fn validate_create(&self, input: &CreateCourseInput) -> Result<(), CourseServiceError> {
        let valid = long_enough(&input.name)
            && long_enough(&input.slug)
            && generate_slug(&input.slug) == input.slug
            && long_enough(&input.description)
            && input.price >= 1;
        if !valid {
            return Err(CourseServiceError::ValidationError);
        }
        self.ensure_tag(input.tag_id).await
    }

    async fn validate_update(&self, input: &UpdateCourseInput) -> Result<(), CourseServiceError> {
        let name_ok = input.name.as_deref().map_or(true, long_enough);
        let description_ok = input.description.as_deref().map_or(true, long_enough);
        let price_ok = input.price.map_or(true, |p| p >= 1);
        if !(name_ok && description_ok && price_ok) {
            return Err(CourseServiceError::ValidationError);
        }
        match input.tag_id {
            Some(tag_id) => self.ensure_tag(tag_id).await,
            None => Ok(()),
        }
    }

    async fn ensure_tag(&self, tag_id: i64) -> Result<(), CourseServiceError> {
        let tag = self
            .tags
            .get_by_id(tag_id)
            .await
            .context("Failed to look up tag")?;
        match tag {
            Some(_) => Ok(()),
            None => Err(CourseServiceError::ValidationError),
        }
    }

    async fn invalidate(&self) {
        let _ = self.cache.delete_prefix(CACHE_PREFIX_COURSE).await;
        let _ = self.cache.delete_prefix(CACHE_PREFIX_CREATOR).await;
    }
}

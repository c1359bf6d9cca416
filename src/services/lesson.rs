//! Lesson service
//!
//! Lessons belong to a course and are managed by the course's teacher. A
//! lesson can only be published once its video is ready, and removing the
//! last published lesson takes the course off the catalogue.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{
    CourseRepository, EnrollmentRepository, LessonRepository, NewUpload, VideoRepository,
};
use crate::models::{Course, CreateLessonInput, Lesson, LessonWithVideo, UpdateLessonInput, User, Video};
use crate::providers::VideoProvider;
use crate::services::course::CACHE_PREFIX_COURSE;
use crate::services::user::CACHE_PREFIX_CREATOR;
use crate::services::{generate_slug, long_enough};
use anyhow::Context;
use std::sync::Arc;

/// Error types for lesson service operations
#[derive(Debug, thiserror::Error)]
pub enum LessonServiceError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Lesson not found.")]
    NotFound,

    #[error("Form validation error.")]
    ValidationError,

    #[error("A lesson with that slug already exists.")]
    DuplicateSlug,

    #[error("Failed to create the lesson.")]
    CreateFailed(#[source] anyhow::Error),

    #[error("Upload a video to publish this lesson.")]
    NoVideo,

    #[error("Please wait for the video to finish processing.")]
    VideoProcessing,

    #[error("Failed to update the lesson.")]
    UpdateFailed(#[source] anyhow::Error),

    #[error("Failed to delete the lesson.")]
    DeleteFailed(#[source] anyhow::Error),

    #[error("Failed to create the upload URL.")]
    UploadFailed(#[source] anyhow::Error),

    #[error("Enroll in the course to watch this lesson.")]
    EnrollmentRequired,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Lesson service
pub struct LessonService {
    courses: Arc<dyn CourseRepository>,
    lessons: Arc<dyn LessonRepository>,
    videos: Arc<dyn VideoRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    video_provider: Arc<dyn VideoProvider>,
    cache: Arc<Cache>,
}

impl LessonService {
    pub fn new(
        courses: Arc<dyn CourseRepository>,
        lessons: Arc<dyn LessonRepository>,
        videos: Arc<dyn VideoRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        video_provider: Arc<dyn VideoProvider>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            courses,
            lessons,
            videos,
            enrollments,
            video_provider,
            cache,
        }
    }

    /// Lesson with its video, looked up by course and lesson slug
    pub async fn get_by_slug(
        &self,
        course_slug: &str,
        lesson_slug: &str,
    ) -> Result<Option<LessonWithVideo>, LessonServiceError> {
        let Some(course) = self
            .courses
            .get_by_slug(course_slug)
            .await
            .context("Failed to get course by slug")?
        else {
            return Ok(None);
        };

        self.lessons
            .get_by_slug(course.id, lesson_slug)
            .await
            .context("Failed to get lesson by slug")
            .map_err(Into::into)
    }

    /// Lesson editor data for the course's teacher
    pub async fn get_for_teacher(
        &self,
        teacher: &User,
        course_slug: &str,
        lesson_slug: &str,
    ) -> Result<LessonWithVideo, LessonServiceError> {
        let course = self.owned_course_by_slug(teacher, course_slug).await?;
        self.lessons
            .get_by_slug(course.id, lesson_slug)
            .await
            .context("Failed to get lesson by slug")?
            .ok_or(LessonServiceError::NotFound)
    }

    /// Add an unpublished lesson to one of the teacher's courses.
    pub async fn create(
        &self,
        teacher: &User,
        course_slug: &str,
        input: &CreateLessonInput,
    ) -> Result<Lesson, LessonServiceError> {
        let course = self.owned_course_by_slug(teacher, course_slug).await?;

        let name = input.name.trim();
        let slug = input.slug.trim();
        if !long_enough(name) || !long_enough(slug) || generate_slug(slug) != slug {
            return Err(LessonServiceError::ValidationError);
        }

        let lesson = Lesson::new(course.id, slug.to_string(), name.to_string());
        let created = match self.lessons.create(&lesson).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => return Err(LessonServiceError::DuplicateSlug),
            Err(e) => return Err(LessonServiceError::CreateFailed(e)),
        };

        self.invalidate().await;
        Ok(created)
    }

    /// Apply a partial update. Publishing needs a ready video; if no
    /// published lesson remains afterwards the course is unpublished.
    pub async fn update(
        &self,
        teacher: &User,
        lesson_id: i64,
        input: &UpdateLessonInput,
    ) -> Result<Lesson, LessonServiceError> {
        let (existing, course) = self.owned_lesson(teacher, lesson_id).await?;

        if input.name.as_deref().is_some_and(|name| !long_enough(name)) {
            return Err(LessonServiceError::ValidationError);
        }
        if input.is_published == Some(true) {
            match &existing.video {
                None => return Err(LessonServiceError::NoVideo),
                Some(video) if !video.is_ready() => return Err(LessonServiceError::VideoProcessing),
                Some(_) => {}
            }
        }

        let mut lesson = existing.lesson;
        lesson.apply(input);
        let updated = self
            .lessons
            .update(&lesson)
            .await
            .map_err(LessonServiceError::UpdateFailed)?;

        self.unpublish_course_if_empty(&course)
            .await
            .map_err(LessonServiceError::UpdateFailed)?;
        self.invalidate().await;
        Ok(updated)
    }

    /// Delete a lesson and its video asset. Returns the sanitised
    /// `redirect_to`, if one was given.
    pub async fn delete(
        &self,
        teacher: &User,
        lesson_id: i64,
        redirect_to: Option<&str>,
    ) -> Result<Option<String>, LessonServiceError> {
        let (existing, course) = self.owned_lesson(teacher, lesson_id).await?;

        self.lessons
            .delete(lesson_id)
            .await
            .map_err(LessonServiceError::DeleteFailed)?;

        if let Some(asset_id) = existing.video.as_ref().and_then(|v| v.asset_id.as_deref()) {
            self.video_provider
                .delete_asset(asset_id)
                .await
                .map_err(LessonServiceError::DeleteFailed)?;
        }

        self.unpublish_course_if_empty(&course)
            .await
            .map_err(LessonServiceError::DeleteFailed)?;
        self.invalidate().await;

        Ok(redirect_to.and_then(local_path).map(str::to_string))
    }

    /// Issue a direct-upload URL for the lesson's video, replacing any
    /// previous upload.
    pub async fn create_upload_url(&self, teacher: &User, lesson_id: i64) -> Result<String, LessonServiceError> {
        let (existing, _course) = self.owned_lesson(teacher, lesson_id).await?;

        if let Some(asset_id) = existing.video.as_ref().and_then(|v| v.asset_id.as_deref()) {
            self.video_provider
                .delete_asset(asset_id)
                .await
                .map_err(LessonServiceError::UploadFailed)?;
        }

        let passthrough = uuid::Uuid::new_v4().to_string();
        let upload = self
            .video_provider
            .create_direct_upload(&passthrough)
            .await
            .map_err(LessonServiceError::UploadFailed)?;

        self.videos
            .upsert_upload(&NewUpload {
                lesson_id,
                teacher_id: teacher.id,
                passthrough,
                upload_id: upload.id,
            })
            .await
            .map_err(LessonServiceError::UploadFailed)?;

        self.invalidate().await;
        Ok(upload.url)
    }

    /// Current video row, polled by the lesson editor while processing
    pub async fn video_status(&self, teacher: &User, lesson_id: i64) -> Result<Option<Video>, LessonServiceError> {
        self.owned_lesson(teacher, lesson_id).await?;
        self.videos
            .get_by_lesson_id(lesson_id)
            .await
            .context("Failed to get video")
            .map_err(Into::into)
    }

    /// A published lesson of a published course, if `viewer` may watch it:
    /// free previews are open to everyone, the rest needs an enrollment or
    /// the course's teacher.
    pub async fn get_for_learner(
        &self,
        viewer: Option<&User>,
        course_slug: &str,
        lesson_slug: &str,
    ) -> Result<LessonWithVideo, LessonServiceError> {
        let course = self
            .courses
            .get_by_slug(course_slug)
            .await
            .context("Failed to get course by slug")?
            .filter(|c| c.is_published)
            .ok_or(LessonServiceError::NotFound)?;
        let lesson = self
            .lessons
            .get_by_slug(course.id, lesson_slug)
            .await
            .context("Failed to get lesson by slug")?
            .filter(|l| l.lesson.is_published)
            .ok_or(LessonServiceError::NotFound)?;

        if lesson.lesson.is_free {
            return Ok(lesson);
        }
        let Some(viewer) = viewer else {
            return Err(LessonServiceError::EnrollmentRequired);
        };
        if viewer.id == course.teacher_id {
            return Ok(lesson);
        }
        let enrolled = self
            .enrollments
            .is_enrolled(viewer.id, course.id)
            .await
            .context("Failed to check enrollment")?;
        if enrolled {
            Ok(lesson)
        } else {
            Err(LessonServiceError::EnrollmentRequired)
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn owned_course_by_slug(&self, teacher: &User, course_slug: &str) -> Result<Course, LessonServiceError> {
        match self
            .courses
            .get_by_slug(course_slug)
            .await
            .context("Failed to get course by slug")?
        {
            Some(course) if course.teacher_id == teacher.id => Ok(course),
            _ => Err(LessonServiceError::Unauthorized),
        }
    }

    async fn owned_lesson(
        &self,
        teacher: &User,
        lesson_id: i64,
    ) -> Result<(LessonWithVideo, Course), LessonServiceError> {
        let lesson = self
            .lessons
            .get_by_id(lesson_id)
            .await
            .context("Failed to get lesson")?
            .ok_or(LessonServiceError::Unauthorized)?;
        match self
            .courses
            .get_by_id(lesson.lesson.course_id)
            .await
            .context("Failed to get course")?
        {
            Some(course) if course.teacher_id == teacher.id => Ok((lesson, course)),
            _ => Err(LessonServiceError::Unauthorized),
        }
    }

    async fn unpublish_course_if_empty(&self, course: &Course) -> anyhow::Result<()> {
        let published = self.lessons.count_published(course.id).await?;
        if published == 0 && course.is_published {
            self.courses.set_published(course.id, false).await?;
            tracing::info!("Course '{}' unpublished: no published lessons left", course.slug);
        }
        Ok(())
    }

    async fn invalidate(&self) {
        let _ = self.cache.delete_prefix(CACHE_PREFIX_COURSE).await;
        let _ = self.cache.delete_prefix(CACHE_PREFIX_CREATOR).await;
    }
}

/// Accept only same-site absolute paths as redirect targets.
fn local_path(target: &str) -> Option<&str> {
    let target = target.trim();
    if target.starts_with('/') && !target.starts_with("//") && !target.contains('\\') {
        Some(target)
    } else {
        None
    }
}

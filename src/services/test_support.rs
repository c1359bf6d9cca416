//! Shared fixtures for service and API tests: an in-memory database with
//! migrations applied, a memory cache, and recording fakes for the video
//! and payment providers.

use crate::cache::{create_cache, Cache};
use crate::config::{CacheConfig, PaymentsConfig};
use crate::db::repositories::{
    CourseRepository, EnrollmentRepository, LessonRepository, NewUpload, SqlxCourseRepository,
    SqlxEnrollmentRepository, SqlxLessonRepository, SqlxTagRepository, SqlxUserRepository,
    SqlxVideoRepository, TagRepository, UserRepository, VideoRepository,
};
use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::models::{
    Course, CreateCourseInput, Lesson, Tag, UpsertUserInput, User, Video, VideoPatch, VideoStatus,
};
use crate::providers::{
    CheckoutRequest, CheckoutSession, DirectUpload, PaymentProvider, VideoProvider,
};
use crate::services::{
    CheckoutService, CourseService, LessonService, TagService, UserService, VideoService,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every call; uploads get sequential ids.
#[derive(Default)]
pub struct FakeVideoProvider {
    pub uploads: Mutex<Vec<String>>,
    pub deleted_assets: Mutex<Vec<String>>,
    pub fail_deletes: AtomicBool,
}

impl FakeVideoProvider {
    pub fn deleted(&self) -> Vec<String> {
        self.deleted_assets.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoProvider for FakeVideoProvider {
    async fn create_direct_upload(&self, passthrough: &str) -> Result<DirectUpload> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(passthrough.to_string());
        let id = format!("upload_{}", uploads.len());
        Ok(DirectUpload {
            url: format!("https://storage.example.com/{}", id),
            id,
        })
    }

    async fn delete_asset(&self, asset_id: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("video platform unavailable");
        }
        self.deleted_assets.lock().unwrap().push(asset_id.to_string());
        Ok(())
    }
}

/// Keeps created sessions in memory so they can be retrieved again.
#[derive(Default)]
pub struct FakePaymentProvider {
    pub requests: Mutex<Vec<CheckoutRequest>>,
    pub sessions: Mutex<HashMap<String, CheckoutSession>>,
    counter: AtomicUsize,
}

impl FakePaymentProvider {
    /// Register a session as the processor would report it
    pub fn put_session(&self, session: CheckoutSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn last_request(&self) -> Option<CheckoutRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let mut metadata = HashMap::new();
        metadata.insert("courseId".to_string(), request.course_id.to_string());
        metadata.insert("userId".to_string(), request.user_external_id.clone());
        let session = CheckoutSession {
            id: format!("cs_test_{}", n),
            url: Some(format!("https://checkout.example.com/cs_test_{}", n)),
            customer: None,
            payment_status: "unpaid".to_string(),
            metadata,
        };
        self.put_session(session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<Option<CheckoutSession>> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }
}

/// Everything a service needs, backed by a fresh in-memory database
pub struct TestEnv {
    pub pool: DynDatabasePool,
    pub cache: Arc<Cache>,
    pub users: Arc<dyn UserRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub courses: Arc<dyn CourseRepository>,
    pub lessons: Arc<dyn LessonRepository>,
    pub videos: Arc<dyn VideoRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub video_provider: Arc<FakeVideoProvider>,
    pub payments: Arc<FakePaymentProvider>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let cache = create_cache(&CacheConfig::default())
            .await
            .expect("Failed to create cache");

        Self {
            users: SqlxUserRepository::boxed(pool.clone()),
            tags: SqlxTagRepository::boxed(pool.clone()),
            courses: SqlxCourseRepository::boxed(pool.clone()),
            lessons: SqlxLessonRepository::boxed(pool.clone()),
            videos: SqlxVideoRepository::boxed(pool.clone()),
            enrollments: SqlxEnrollmentRepository::boxed(pool.clone()),
            video_provider: Arc::new(FakeVideoProvider::default()),
            payments: Arc::new(FakePaymentProvider::default()),
            pool,
            cache,
        }
    }

    // ------------------------------------------------------------------
    // Services
    // ------------------------------------------------------------------

    pub fn tag_service(&self) -> TagService {
        TagService::new(self.tags.clone(), self.cache.clone())
    }

    pub fn user_service(&self) -> UserService {
        UserService::new(self.users.clone(), self.enrollments.clone(), self.cache.clone())
    }

    pub fn course_service(&self) -> CourseService {
        CourseService::new(
            self.courses.clone(),
            self.lessons.clone(),
            self.videos.clone(),
            self.enrollments.clone(),
            self.tags.clone(),
            self.users.clone(),
            self.video_provider.clone(),
            self.cache.clone(),
        )
    }

    pub fn lesson_service(&self) -> LessonService {
        LessonService::new(
            self.courses.clone(),
            self.lessons.clone(),
            self.videos.clone(),
            self.enrollments.clone(),
            self.video_provider.clone(),
            self.cache.clone(),
        )
    }

    pub fn video_service(&self) -> VideoService {
        VideoService::new(self.videos.clone(), self.cache.clone())
    }

    pub fn checkout_service(&self, dev_refunds: bool) -> CheckoutService {
        let config = PaymentsConfig {
            dev_refunds,
            ..PaymentsConfig::default()
        };
        CheckoutService::new(
            self.courses.clone(),
            self.lessons.clone(),
            self.users.clone(),
            self.enrollments.clone(),
            self.payments.clone(),
            &config,
        )
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    pub async fn user(&self, external_id: &str) -> User {
        self.users
            .upsert(&UpsertUserInput {
                external_id: external_id.to_string(),
                email: format!("{}@example.com", external_id),
                name: Some(external_id.to_string()),
                image_url: None,
            })
            .await
            .unwrap()
    }

    pub async fn tag(&self, name: &str) -> Tag {
        self.tags
            .create(&Tag::new(name.to_lowercase(), name.to_string()))
            .await
            .unwrap()
    }

    /// Unpublished course priced at 25
    pub async fn course(&self, teacher: &User, tag: &Tag, slug: &str) -> Course {
        let input = CreateCourseInput {
            name: format!("Course {}", slug),
            slug: slug.to_string(),
            description: "A practical course".to_string(),
            price: 25,
            tag_id: tag.id,
        };
        self.courses
            .create(&Course::new(teacher.id, &input))
            .await
            .unwrap()
    }

    pub async fn publish_course(&self, course: &Course) {
        self.courses.set_published(course.id, true).await.unwrap();
    }

    /// Unpublished, non-free lesson
    pub async fn lesson(&self, course: &Course, slug: &str) -> Lesson {
        self.lessons
            .create(&Lesson::new(course.id, slug.to_string(), format!("Lesson {}", slug)))
            .await
            .unwrap()
    }

    /// Mark a lesson published (and optionally free) directly in storage
    pub async fn publish_lesson(&self, lesson: &Lesson, is_free: bool) -> Lesson {
        let mut lesson = lesson.clone();
        lesson.is_published = true;
        lesson.is_free = is_free;
        self.lessons.update(&lesson).await.unwrap()
    }

    /// Attach a video in `status` with an asset and playback id
    pub async fn video(&self, lesson: &Lesson, teacher: &User, status: VideoStatus) -> Video {
        let passthrough = format!("pt-{}", lesson.id);
        self.videos
            .upsert_upload(&NewUpload {
                lesson_id: lesson.id,
                teacher_id: teacher.id,
                passthrough: passthrough.clone(),
                upload_id: format!("upload-{}", lesson.id),
            })
            .await
            .unwrap();
        self.videos
            .update_by_passthrough(
                &passthrough,
                &VideoPatch {
                    status: Some(status),
                    asset_id: Some(format!("asset-{}", lesson.id)),
                    playback_id: Some(format!("playback-{}", lesson.id)),
                    duration: Some(90.0),
                    aspect_ratio: Some("16:9".to_string()),
                },
            )
            .await
            .unwrap();
        self.videos
            .get_by_passthrough(&passthrough)
            .await
            .unwrap()
            .unwrap()
    }
}

//! CourseHub - A course marketplace backend

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursehub::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{
            SqlxCourseRepository, SqlxEnrollmentRepository, SqlxLessonRepository,
            SqlxTagRepository, SqlxUserRepository, SqlxVideoRepository,
        },
    },
    providers::{MuxClient, SessionTokenVerifier, StripeClient},
    services::{
        CheckoutService, CourseService, LessonService, TagService, UserService, VideoService,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursehub=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CourseHub...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");
    if config.auth.session_secret.is_empty() {
        tracing::warn!("auth.session_secret is not set, every request will be anonymous");
    }
    if config.payments.dev_refunds {
        tracing::warn!("Development refunds are enabled");
    }

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Initialize cache
    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized");

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let tag_repo = SqlxTagRepository::boxed(pool.clone());
    let course_repo = SqlxCourseRepository::boxed(pool.clone());
    let lesson_repo = SqlxLessonRepository::boxed(pool.clone());
    let video_repo = SqlxVideoRepository::boxed(pool.clone());
    let enrollment_repo = SqlxEnrollmentRepository::boxed(pool.clone());

    // External providers
    let video_provider = Arc::new(MuxClient::new(&config.video)?);
    let payment_provider = Arc::new(StripeClient::new(&config.payments)?);
    let identity = Arc::new(SessionTokenVerifier::new(&config.auth));

    // Initialize services
    let tag_service = Arc::new(TagService::new(tag_repo.clone(), cache.clone()));
    let seeded = tag_service.seed(&config.catalog.tags).await?;
    tracing::info!("Catalogue tags ready ({} new)", seeded);

    let user_service = Arc::new(UserService::new(
        user_repo.clone(),
        enrollment_repo.clone(),
        cache.clone(),
    ));
    let course_service = Arc::new(CourseService::new(
        course_repo.clone(),
        lesson_repo.clone(),
        video_repo.clone(),
        enrollment_repo.clone(),
        tag_repo,
        user_repo.clone(),
        video_provider.clone(),
        cache.clone(),
    ));
    let lesson_service = Arc::new(LessonService::new(
        course_repo.clone(),
        lesson_repo.clone(),
        video_repo.clone(),
        enrollment_repo.clone(),
        video_provider,
        cache.clone(),
    ));
    let video_service = Arc::new(
        VideoService::new(video_repo, cache.clone())
            .with_webhook_secret(config.video.webhook_secret.clone()),
    );
    let checkout_service = Arc::new(CheckoutService::new(
        course_repo,
        lesson_repo,
        user_repo,
        enrollment_repo,
        payment_provider,
        &config.payments,
    ));

    // Build application state
    let state = AppState {
        identity,
        user_service,
        tag_service,
        course_service,
        lesson_service,
        video_service,
        checkout_service,
        public_origin: config.server.cors_origin.clone(),
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

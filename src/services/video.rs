//! Video webhook processing
//!
//! The video platform reports the lifecycle of each upload through signed
//! webhooks. Rows are matched on the passthrough id attached at upload
//! time, so replayed or reordered deliveries only ever rewrite the same
//! row.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::VideoRepository;
use crate::models::{VideoPatch, VideoStatus};
use crate::providers::signature::{self, SignatureError, DEFAULT_TOLERANCE_SECS};
use crate::providers::{VideoEventData, VideoWebhookEvent};
use crate::services::course::CACHE_PREFIX_COURSE;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

pub const ASSET_CREATED: &str = "video.asset.created";
pub const ASSET_READY: &str = "video.asset.ready";
pub const ASSET_ERRORED: &str = "video.asset.errored";
pub const UPLOAD_CANCELLED: &str = "video.upload.cancelled";

/// Error types for video webhook processing
#[derive(Debug, thiserror::Error)]
pub enum VideoServiceError {
    #[error("Video webhook secret is not configured")]
    NotConfigured,

    #[error("Error occurred")]
    InvalidSignature(#[source] SignatureError),

    #[error("Error occurred")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("Video not found!")]
    VideoNotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// What a webhook delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEventOutcome {
    Updated,
    /// Acknowledged without changes
    Ignored,
}

/// Video service
pub struct VideoService {
    videos: Arc<dyn VideoRepository>,
    cache: Arc<Cache>,
    webhook_secret: String,
}

impl VideoService {
    pub fn new(videos: Arc<dyn VideoRepository>, cache: Arc<Cache>) -> Self {
        Self {
            videos,
            cache,
            webhook_secret: String::new(),
        }
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = secret.into();
        self
    }

    /// Verify and apply a raw webhook delivery.
    pub async fn handle_webhook(
        &self,
        signature_header: Option<&str>,
        body: &[u8],
    ) -> Result<VideoEventOutcome, VideoServiceError> {
        self.handle_webhook_at(signature_header, body, Utc::now().timestamp())
            .await
    }

    pub(crate) async fn handle_webhook_at(
        &self,
        signature_header: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<VideoEventOutcome, VideoServiceError> {
        match signature::verify(
            &self.webhook_secret,
            signature_header,
            body,
            now,
            DEFAULT_TOLERANCE_SECS,
        ) {
            Ok(()) => {}
            Err(SignatureError::MissingSecret) => return Err(VideoServiceError::NotConfigured),
            Err(e) => {
                tracing::warn!("Rejected video webhook: {}", e);
                return Err(VideoServiceError::InvalidSignature(e));
            }
        }

        let event: VideoWebhookEvent =
            serde_json::from_slice(body).map_err(VideoServiceError::InvalidPayload)?;
        self.handle_event(&event).await
    }

    /// Apply a verified event.
    pub async fn handle_event(&self, event: &VideoWebhookEvent) -> Result<VideoEventOutcome, VideoServiceError> {
        let data = &event.data;
        let outcome = match event.event_type.as_str() {
            ASSET_CREATED => {
                let video = self.find_video(data).await?;
                if video.status == VideoStatus::Ready {
                    VideoEventOutcome::Ignored
                } else {
                    let patch = VideoPatch {
                        status: Some(event_status(data, VideoStatus::Preparing)),
                        asset_id: data.id.clone(),
                        playback_id: data.first_playback_id().map(str::to_string),
                        ..Default::default()
                    };
                    self.apply(&video.passthrough, &patch).await?
                }
            }
            ASSET_READY => {
                let video = self.find_video(data).await?;
                let patch = VideoPatch {
                    status: Some(event_status(data, VideoStatus::Ready)),
                    asset_id: data.id.clone(),
                    playback_id: data.first_playback_id().map(str::to_string),
                    duration: data.duration,
                    aspect_ratio: data.aspect_ratio.clone(),
                    ..Default::default()
                };
                self.apply(&video.passthrough, &patch).await?
            }
            ASSET_ERRORED => {
                let video = self.find_video(data).await?;
                self.apply(&video.passthrough, &VideoPatch::status(VideoStatus::Errored))
                    .await?
            }
            UPLOAD_CANCELLED => {
                let video = self.find_video(data).await?;
                self.apply(&video.passthrough, &VideoPatch::status(VideoStatus::Cancelled))
                    .await?
            }
            other => {
                tracing::debug!("Ignoring video event {}", other);
                VideoEventOutcome::Ignored
            }
        };

        if outcome == VideoEventOutcome::Updated {
            tracing::info!("Applied video event {}", event.event_type);
        }
        Ok(outcome)
    }

    async fn find_video(&self, data: &VideoEventData) -> Result<crate::models::Video, VideoServiceError> {
        let passthrough = data.passthrough().ok_or(VideoServiceError::VideoNotFound)?;
        self.videos
            .get_by_passthrough(passthrough)
            .await
            .context("Failed to look up video")?
            .ok_or(VideoServiceError::VideoNotFound)
    }

    async fn apply(&self, passthrough: &str, patch: &VideoPatch) -> Result<VideoEventOutcome, VideoServiceError> {
        let updated = self
            .videos
            .update_by_passthrough(passthrough, patch)
            .await
            .context("Failed to update video")?;
        if !updated {
            return Err(VideoServiceError::VideoNotFound);
        }

        let _ = self.cache.delete_prefix(CACHE_PREFIX_COURSE).await;
        Ok(VideoEventOutcome::Updated)
    }
}

/// Status reported in the event, or `fallback` if absent or unknown
fn event_status(data: &VideoEventData, fallback: VideoStatus) -> VideoStatus {
    data.status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::NewUpload;
    use crate::services::test_support::TestEnv;
    use serde_json::json;

    const SECRET: &str = "mux_whsec";
    const NOW: i64 = 1_700_000_000;

    async fn waiting_upload(env: &TestEnv) -> String {
        let teacher = env.user("teacher").await;
        let tag = env.tag("Development").await;
        let course = env.course(&teacher, &tag, "video-course").await;
        let lesson = env.lesson(&course, "intro").await;
        env.videos
            .upsert_upload(&NewUpload {
                lesson_id: lesson.id,
                teacher_id: teacher.id,
                passthrough: "pt-1".to_string(),
                upload_id: "upload-1".to_string(),
            })
            .await
            .unwrap();
        "pt-1".to_string()
    }

    fn event(value: serde_json::Value) -> VideoWebhookEvent {
        serde_json::from_value(value).unwrap()
    }

    fn created(passthrough: &str) -> VideoWebhookEvent {
        event(json!({
            "type": "video.asset.created",
            "data": {
                "id": "asset-1",
                "status": "preparing",
                "passthrough": passthrough,
                "playback_ids": [{"id": "play-1"}]
            }
        }))
    }

    fn ready(passthrough: &str) -> VideoWebhookEvent {
        event(json!({
            "type": "video.asset.ready",
            "data": {
                "id": "asset-1",
                "status": "ready",
                "passthrough": passthrough,
                "playback_ids": [{"id": "play-1"}],
                "duration": 61.5,
                "aspect_ratio": "16:9"
            }
        }))
    }

    #[tokio::test]
    async fn test_asset_lifecycle() {
        let env = TestEnv::new().await;
        let passthrough = waiting_upload(&env).await;
        let service = env.video_service();

        assert_eq!(service.handle_event(&created(&passthrough)).await.unwrap(), VideoEventOutcome::Updated);
        let video = env.videos.get_by_passthrough(&passthrough).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Preparing);
        assert_eq!(video.asset_id.as_deref(), Some("asset-1"));
        assert_eq!(video.playback_id.as_deref(), Some("play-1"));

        service.handle_event(&ready(&passthrough)).await.unwrap();
        let video = env.videos.get_by_passthrough(&passthrough).await.unwrap().unwrap();
        assert!(video.is_ready());
        assert_eq!(video.duration, Some(61.5));
        assert_eq!(video.aspect_ratio.as_deref(), Some("16:9"));
    }

    #[tokio::test]
    async fn test_late_created_event_does_not_regress_ready_video() {
        let env = TestEnv::new().await;
        let passthrough = waiting_upload(&env).await;
        let service = env.video_service();

        service.handle_event(&created(&passthrough)).await.unwrap();
        service.handle_event(&ready(&passthrough)).await.unwrap();
        let outcome = service.handle_event(&created(&passthrough)).await.unwrap();

        assert_eq!(outcome, VideoEventOutcome::Ignored);
        let video = env.videos.get_by_passthrough(&passthrough).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
    }

    #[tokio::test]
    async fn test_ready_before_created_keeps_asset_ids() {
        let env = TestEnv::new().await;
        let passthrough = waiting_upload(&env).await;
        let service = env.video_service();

        service.handle_event(&ready(&passthrough)).await.unwrap();
        let outcome = service.handle_event(&created(&passthrough)).await.unwrap();

        assert_eq!(outcome, VideoEventOutcome::Ignored);
        let video = env.videos.get_by_passthrough(&passthrough).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.asset_id.as_deref(), Some("asset-1"));
        assert_eq!(video.playback_id.as_deref(), Some("play-1"));
        assert!(video.is_ready());
    }

    #[tokio::test]
    async fn test_upload_cancelled_reads_asset_settings() {
        let env = TestEnv::new().await;
        let passthrough = waiting_upload(&env).await;
        let cancelled = event(json!({
            "type": "video.upload.cancelled",
            "data": {"id": "upload-1", "new_asset_settings": {"passthrough": passthrough}}
        }));

        env.video_service().handle_event(&cancelled).await.unwrap();

        let video = env.videos.get_by_passthrough("pt-1").await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_errored_asset() {
        let env = TestEnv::new().await;
        let passthrough = waiting_upload(&env).await;
        let errored = event(json!({
            "type": "video.asset.errored",
            "data": {"id": "asset-1", "passthrough": passthrough}
        }));

        env.video_service().handle_event(&errored).await.unwrap();

        let video = env.videos.get_by_passthrough("pt-1").await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Errored);
    }

    #[tokio::test]
    async fn test_unknown_passthrough() {
        let env = TestEnv::new().await;
        let result = env.video_service().handle_event(&created("nope")).await;

        assert!(matches!(result, Err(VideoServiceError::VideoNotFound)));
        assert_eq!(result.unwrap_err().to_string(), "Video not found!");
    }

    #[tokio::test]
    async fn test_unhandled_event_is_ignored() {
        let env = TestEnv::new().await;
        let other = event(json!({"type": "video.upload.asset_created", "data": {"id": "x"}}));

        assert_eq!(
            env.video_service().handle_event(&other).await.unwrap(),
            VideoEventOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_signed_webhook() {
        let env = TestEnv::new().await;
        let passthrough = waiting_upload(&env).await;
        let service = env.video_service().with_webhook_secret(SECRET);
        let body = serde_json::to_vec(&json!({
            "type": "video.asset.created",
            "data": {"id": "asset-9", "status": "preparing", "passthrough": passthrough, "playback_ids": [{"id": "p"}]}
        }))
        .unwrap();

        let header = signature::sign(SECRET, &body, NOW);
        let outcome = service.handle_webhook_at(Some(header.as_str()), &body, NOW).await.unwrap();
        assert_eq!(outcome, VideoEventOutcome::Updated);

        let forged = signature::sign("wrong", &body, NOW);
        let rejected = service.handle_webhook_at(Some(&forged), &body, NOW).await;
        assert!(matches!(rejected, Err(VideoServiceError::InvalidSignature(_))));
        assert_eq!(rejected.unwrap_err().to_string(), "Error occurred");
    }

    #[tokio::test]
    async fn test_webhook_without_secret() {
        let env = TestEnv::new().await;
        let result = env
            .video_service()
            .handle_webhook_at(Some("t=1,v1=00"), b"{}", NOW)
            .await;
        assert!(matches!(result, Err(VideoServiceError::NotConfigured)));
    }

    #[test]
    fn test_event_status_fallback() {
        let data = VideoEventData {
            status: Some("bogus".to_string()),
            ..Default::default()
        };
        assert_eq!(event_status(&data, VideoStatus::Ready), VideoStatus::Ready);
        let data = VideoEventData {
            status: Some("errored".to_string()),
            ..Default::default()
        };
        assert_eq!(event_status(&data, VideoStatus::Ready), VideoStatus::Errored);
    }
}

//! Video platform client
//!
//! Teachers upload straight from the browser to a one-shot URL we request
//! here; the platform then reports progress through signed webhooks. Our
//! own row is matched through the `passthrough` string we attach to the
//! upload.

use crate::config::VideoConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// A direct-upload slot at the video platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectUpload {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Request a direct-upload URL whose asset will carry `passthrough`.
    async fn create_direct_upload(&self, passthrough: &str) -> Result<DirectUpload>;

    /// Delete an asset. Deleting an asset that no longer exists succeeds.
    async fn delete_asset(&self, asset_id: &str) -> Result<()>;
}

/// Mux API client
pub struct MuxClient {
    client: reqwest::Client,
    api_url: String,
    token_id: String,
    token_secret: String,
    cors_origin: String,
}

impl std::fmt::Debug for MuxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreateUploadRequest<'a> {
    cors_origin: &'a str,
    new_asset_settings: NewAssetSettingsRequest<'a>,
}

#[derive(Serialize)]
struct NewAssetSettingsRequest<'a> {
    playback_policy: [&'a str; 1],
    encoding_tier: &'a str,
    passthrough: &'a str,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

impl MuxClient {
    pub fn new(config: &VideoConfig) -> Result<Self> {
        Ok(Self {
            client: super::http_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token_id: config.token_id.clone(),
            token_secret: config.token_secret.clone(),
            cors_origin: config.cors_origin.clone(),
        })
    }
}

#[async_trait]
impl VideoProvider for MuxClient {
    async fn create_direct_upload(&self, passthrough: &str) -> Result<DirectUpload> {
        let body = CreateUploadRequest {
            cors_origin: &self.cors_origin,
            new_asset_settings: NewAssetSettingsRequest {
                playback_policy: ["public"],
                encoding_tier: "baseline",
                passthrough,
            },
        };

        let response = self
            .client
            .post(format!("{}/video/v1/uploads", self.api_url))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .json(&body)
            .send()
            .await
            .context("Failed to request direct upload")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Video platform rejected upload request ({}): {}", status, text);
        }

        let envelope: DataEnvelope<DirectUpload> = response
            .json()
            .await
            .context("Failed to parse direct upload response")?;
        Ok(envelope.data)
    }

    async fn delete_asset(&self, asset_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{}/video/v1/assets/{}",
                self.api_url,
                urlencoding::encode(asset_id)
            ))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .send()
            .await
            .context("Failed to delete video asset")?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        anyhow::bail!("Video platform refused to delete asset {} ({})", asset_id, status)
    }
}

// ============================================================================
// Webhook payloads
// ============================================================================

/// A video platform webhook delivery
#[derive(Debug, Clone, Deserialize)]
pub struct VideoWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: VideoEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoEventData {
    /// Upload id for `video.upload.*`, asset id for `video.asset.*`
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub passthrough: Option<String>,
    #[serde(default)]
    pub playback_ids: Vec<PlaybackId>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub new_asset_settings: Option<NewAssetSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackId {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAssetSettings {
    #[serde(default)]
    pub passthrough: Option<String>,
}

impl VideoEventData {
    /// The passthrough attached at upload time. Upload events only carry it
    /// inside the asset settings they were created with.
    pub fn passthrough(&self) -> Option<&str> {
        self.passthrough
            .as_deref()
            .or_else(|| {
                self.new_asset_settings
                    .as_ref()
                    .and_then(|settings| settings.passthrough.as_deref())
            })
            .filter(|p| !p.is_empty())
    }

    pub fn first_playback_id(&self) -> Option<&str> {
        self.playback_ids.first().map(|p| p.id.as_str())
    }
}

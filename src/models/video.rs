//! Video model
//!
//! A video row mirrors one asset at the video provider. It is created when an
//! upload URL is issued and then advanced by provider webhooks, matched on
//! the passthrough ID we attached to the upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Video entity, one per lesson.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Video {
    pub id: i64,
    pub lesson_id: i64,
    pub teacher_id: i64,
    pub status: VideoStatus,
    /// Opaque ID sent with the upload and echoed back by webhooks
    pub passthrough: String,
    pub upload_id: Option<String>,
    pub asset_id: Option<String>,
    pub playback_id: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub aspect_ratio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// A video can be played once the asset is ready and has a playback ID.
    pub fn is_ready(&self) -> bool {
        self.status == VideoStatus::Ready && self.playback_id.is_some()
    }
}

/// Lifecycle of an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    /// Upload URL issued, nothing received yet
    #[default]
    Waiting,
    /// Asset created, provider is transcoding
    Preparing,
    Ready,
    Errored,
    Cancelled,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Waiting => "waiting",
            VideoStatus::Preparing => "preparing",
            VideoStatus::Ready => "ready",
            VideoStatus::Errored => "errored",
            VideoStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(VideoStatus::Waiting),
            "preparing" => Ok(VideoStatus::Preparing),
            "ready" => Ok(VideoStatus::Ready),
            "errored" => Ok(VideoStatus::Errored),
            "cancelled" => Ok(VideoStatus::Cancelled),
            _ => Err(format!("Invalid video status: {}", s)),
        }
    }
}

/// Partial update applied by webhooks. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoPatch {
    pub status: Option<VideoStatus>,
    pub asset_id: Option<String>,
    pub playback_id: Option<String>,
    pub duration: Option<f64>,
    pub aspect_ratio: Option<String>,
}

impl VideoPatch {
    pub fn status(status: VideoStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

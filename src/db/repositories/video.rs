//! Video repository
//!
//! Video rows are written in two ways: upserted per lesson when an upload URL
//! is issued, and patched by provider webhooks keyed on the passthrough ID.

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use crate::models::{Video, VideoPatch, VideoStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

pub(crate) const VIDEO_COLUMNS: &str = "id, lesson_id, teacher_id, status, passthrough, upload_id, \
     asset_id, playback_id, duration, aspect_ratio, created_at, updated_at";

/// Video columns prefixed `video_` for joins against lessons
pub(crate) const VIDEO_JOIN_COLUMNS: &str = "v.id AS video_id, v.lesson_id AS video_lesson_id, \
     v.teacher_id AS video_teacher_id, v.status AS video_status, \
     v.passthrough AS video_passthrough, v.upload_id AS video_upload_id, \
     v.asset_id AS video_asset_id, v.playback_id AS video_playback_id, \
     v.duration AS video_duration, v.aspect_ratio AS video_aspect_ratio, \
     v.created_at AS video_created_at, v.updated_at AS video_updated_at";

/// Fresh upload state for a lesson's video
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub lesson_id: i64,
    pub teacher_id: i64,
    pub passthrough: String,
    pub upload_id: String,
}

/// Video repository trait
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get_by_lesson_id(&self, lesson_id: i64) -> Result<Option<Video>>;

    async fn get_by_passthrough(&self, passthrough: &str) -> Result<Option<Video>>;

    /// Create or reset the lesson's video to `waiting` with a new upload.
    /// Asset, playback, duration and aspect ratio are cleared.
    async fn upsert_upload(&self, upload: &NewUpload) -> Result<Video>;

    /// Apply `patch` to the video with this passthrough. Returns false if none matched.
    async fn update_by_passthrough(&self, passthrough: &str, patch: &VideoPatch) -> Result<bool>;

    /// Asset IDs of every video under a course
    async fn asset_ids_for_course(&self, course_id: i64) -> Result<Vec<String>>;
}

/// SQLx-based video repository implementation
pub struct SqlxVideoRepository {
    pool: DynDatabasePool,
}

impl SqlxVideoRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn VideoRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl VideoRepository for SqlxVideoRepository {
    async fn get_by_lesson_id(&self, lesson_id: i64) -> Result<Option<Video>> {
        let sql = format!("SELECT {} FROM videos WHERE lesson_id = ?", VIDEO_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(lesson_id)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get video by lesson")?;
                Ok(match row {
                    Some(row) => row_to_video_sqlite(&row, "")?,
                    None => None,
                })
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(lesson_id)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get video by lesson")?;
                Ok(match row {
                    Some(row) => row_to_video_mysql(&row, "")?,
                    None => None,
                })
            }
        }
    }

    async fn get_by_passthrough(&self, passthrough: &str) -> Result<Option<Video>> {
        let sql = format!("SELECT {} FROM videos WHERE passthrough = ?", VIDEO_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(passthrough)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get video by passthrough")?;
                Ok(match row {
                    Some(row) => row_to_video_sqlite(&row, "")?,
                    None => None,
                })
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(passthrough)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get video by passthrough")?;
                Ok(match row {
                    Some(row) => row_to_video_mysql(&row, "")?,
                    None => None,
                })
            }
        }
    }

    async fn upsert_upload(&self, upload: &NewUpload) -> Result<Video> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => upsert_upload_sqlite(sqlite(&self.pool)?, upload).await?,
            DatabaseDriver::Mysql => upsert_upload_mysql(mysql(&self.pool)?, upload).await?,
        }

        self.get_by_lesson_id(upload.lesson_id)
            .await?
            .context("Video missing after upsert")
    }

    async fn update_by_passthrough(&self, passthrough: &str, patch: &VideoPatch) -> Result<bool> {
        // COALESCE keeps the stored value wherever the patch has none.
        let sql = r#"
            UPDATE videos
            SET status = COALESCE(?, status),
                asset_id = COALESCE(?, asset_id),
                playback_id = COALESCE(?, playback_id),
                duration = COALESCE(?, duration),
                aspect_ratio = COALESCE(?, aspect_ratio),
                updated_at = ?
            WHERE passthrough = ?
        "#;
        let status = patch.status.map(|s| s.as_str());
        let now = Utc::now();

        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(status)
                .bind(&patch.asset_id)
                .bind(&patch.playback_id)
                .bind(patch.duration)
                .bind(&patch.aspect_ratio)
                .bind(now)
                .bind(passthrough)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to update video")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(status)
                .bind(&patch.asset_id)
                .bind(&patch.playback_id)
                .bind(patch.duration)
                .bind(&patch.aspect_ratio)
                .bind(now)
                .bind(passthrough)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to update video")?
                .rows_affected(),
        };

        Ok(affected > 0)
    }

    async fn asset_ids_for_course(&self, course_id: i64) -> Result<Vec<String>> {
        let sql = r#"
            SELECT v.asset_id AS asset_id
            FROM videos v
            JOIN lessons l ON l.id = v.lesson_id
            WHERE l.course_id = ? AND v.asset_id IS NOT NULL
            ORDER BY v.id
        "#;
        let ids: Vec<String> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(course_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list course assets")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(course_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list course assets")?,
        };
        Ok(ids)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn upsert_upload_sqlite(pool: &SqlitePool, upload: &NewUpload) -> Result<()> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO videos (lesson_id, teacher_id, status, passthrough, upload_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(lesson_id) DO UPDATE SET
            teacher_id = excluded.teacher_id,
            status = excluded.status,
            passthrough = excluded.passthrough,
            upload_id = excluded.upload_id,
            asset_id = NULL,
            playback_id = NULL,
            duration = NULL,
            aspect_ratio = NULL,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(upload.lesson_id)
    .bind(upload.teacher_id)
    .bind(VideoStatus::Waiting.as_str())
    .bind(&upload.passthrough)
    .bind(&upload.upload_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert video upload")?;

    Ok(())
}

/// Map a video from `row`, reading columns named `{prefix}{column}`.
/// Returns `None` when the ID column is NULL (no video on a LEFT JOIN).
pub(crate) fn row_to_video_sqlite(
    row: &sqlx::sqlite::SqliteRow,
    prefix: &str,
) -> Result<Option<Video>> {
    let col = |name: &str| format!("{}{}", prefix, name);

    let id: Option<i64> = row.get(col("id").as_str());
    let Some(id) = id else {
        return Ok(None);
    };
    let status: String = row.get(col("status").as_str());

    Ok(Some(Video {
        id,
        lesson_id: row.get(col("lesson_id").as_str()),
        teacher_id: row.get(col("teacher_id").as_str()),
        status: VideoStatus::from_str(&status).map_err(anyhow::Error::msg)?,
        passthrough: row.get(col("passthrough").as_str()),
        upload_id: row.get(col("upload_id").as_str()),
        asset_id: row.get(col("asset_id").as_str()),
        playback_id: row.get(col("playback_id").as_str()),
        duration: row.get(col("duration").as_str()),
        aspect_ratio: row.get(col("aspect_ratio").as_str()),
        created_at: row.get(col("created_at").as_str()),
        updated_at: row.get(col("updated_at").as_str()),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn upsert_upload_mysql(pool: &MySqlPool, upload: &NewUpload) -> Result<()> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO videos (lesson_id, teacher_id, status, passthrough, upload_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            teacher_id = VALUES(teacher_id),
            status = VALUES(status),
            passthrough = VALUES(passthrough),
            upload_id = VALUES(upload_id),
            asset_id = NULL,
            playback_id = NULL,
            duration = NULL,
            aspect_ratio = NULL,
            updated_at = VALUES(updated_at)
        "#,
    )
    .bind(upload.lesson_id)
    .bind(upload.teacher_id)
    .bind(VideoStatus::Waiting.as_str())
    .bind(&upload.passthrough)
    .bind(&upload.upload_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert video upload")?;

    Ok(())
}

/// MySQL counterpart of [`row_to_video_sqlite`]
pub(crate) fn row_to_video_mysql(row: &sqlx::mysql::MySqlRow, prefix: &str) -> Result<Option<Video>> {
    let col = |name: &str| format!("{}{}", prefix, name);

    let id: Option<i64> = row.get(col("id").as_str());
    let Some(id) = id else {
        return Ok(None);
    };
    let status: String = row.get(col("status").as_str());

    Ok(Some(Video {
        id,
        lesson_id: row.get(col("lesson_id").as_str()),
        teacher_id: row.get(col("teacher_id").as_str()),
        status: VideoStatus::from_str(&status).map_err(anyhow::Error::msg)?,
        passthrough: row.get(col("passthrough").as_str()),
        upload_id: row.get(col("upload_id").as_str()),
        asset_id: row.get(col("asset_id").as_str()),
        playback_id: row.get(col("playback_id").as_str()),
        duration: row.get(col("duration").as_str()),
        aspect_ratio: row.get(col("aspect_ratio").as_str()),
        created_at: row.get(col("created_at").as_str()),
        updated_at: row.get(col("updated_at").as_str()),
    }))
}

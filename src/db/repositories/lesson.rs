//! Lesson repository
//!
//! Lessons are usually read together with their video through a LEFT JOIN,
//! since every course and lesson page needs the playback state.

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use crate::models::{Lesson, LessonWithVideo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::video::{row_to_video_mysql, row_to_video_sqlite, VIDEO_JOIN_COLUMNS};

const LESSON_COLUMNS: &str = "l.id AS id, l.course_id AS course_id, l.slug AS slug, l.name AS name, \
     l.content AS content, l.is_published AS is_published, l.is_free AS is_free, \
     l.created_at AS created_at, l.updated_at AS updated_at";

fn lesson_with_video_sql(condition: &str) -> String {
    format!(
        "SELECT {}, {} FROM lessons l LEFT JOIN videos v ON v.lesson_id = l.id WHERE {} \
         ORDER BY l.created_at ASC, l.id ASC",
        LESSON_COLUMNS, VIDEO_JOIN_COLUMNS, condition
    )
}

/// Lesson repository trait
#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// Insert a lesson; `id` and timestamps on the input are ignored
    async fn create(&self, lesson: &Lesson) -> Result<Lesson>;

    async fn get_by_id(&self, id: i64) -> Result<Option<LessonWithVideo>>;

    /// Lesson by slug within a course
    async fn get_by_slug(&self, course_id: i64, slug: &str) -> Result<Option<LessonWithVideo>>;

    /// Lessons of a course, oldest first
    async fn list_by_course(
        &self,
        course_id: i64,
        published_only: bool,
    ) -> Result<Vec<LessonWithVideo>>;

    /// Persist all mutable fields of `lesson`
    async fn update(&self, lesson: &Lesson) -> Result<Lesson>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count_published(&self, course_id: i64) -> Result<i64>;
}

/// SQLx-based lesson repository implementation
pub struct SqlxLessonRepository {
    pool: DynDatabasePool,
}

impl SqlxLessonRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LessonRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch(&self, condition: &str, binds: Binds<'_>) -> Result<Vec<LessonWithVideo>> {
        let sql = lesson_with_video_sql(condition);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql).bind(binds.id);
                if let Some(slug) = binds.slug {
                    query = query.bind(slug);
                }
                let rows = query
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to fetch lessons")?;
                rows.iter().map(row_to_lesson_with_video_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql).bind(binds.id);
                if let Some(slug) = binds.slug {
                    query = query.bind(slug);
                }
                let rows = query
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to fetch lessons")?;
                rows.iter().map(row_to_lesson_with_video_mysql).collect()
            }
        }
    }
}

/// Positional parameters for [`SqlxLessonRepository::fetch`]
struct Binds<'a> {
    id: i64,
    slug: Option<&'a str>,
}

#[async_trait]
impl LessonRepository for SqlxLessonRepository {
    async fn create(&self, lesson: &Lesson) -> Result<Lesson> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_lesson_sqlite(sqlite(&self.pool)?, lesson).await,
            DatabaseDriver::Mysql => create_lesson_mysql(mysql(&self.pool)?, lesson).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<LessonWithVideo>> {
        let rows = self.fetch("l.id = ?", Binds { id, slug: None }).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_by_slug(&self, course_id: i64, slug: &str) -> Result<Option<LessonWithVideo>> {
        let rows = self
            .fetch(
                "l.course_id = ? AND l.slug = ?",
                Binds {
                    id: course_id,
                    slug: Some(slug),
                },
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_by_course(
        &self,
        course_id: i64,
        published_only: bool,
    ) -> Result<Vec<LessonWithVideo>> {
        let condition = if published_only {
            "l.course_id = ? AND l.is_published = TRUE"
        } else {
            "l.course_id = ?"
        };
        self.fetch(condition, Binds { id: course_id, slug: None }).await
    }

    async fn update(&self, lesson: &Lesson) -> Result<Lesson> {
        let now = Utc::now();
        let content = encode_content(lesson)?;
        let sql = r#"
            UPDATE lessons
            SET name = ?, content = ?, is_published = ?, is_free = ?, updated_at = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&lesson.name)
                    .bind(&content)
                    .bind(lesson.is_published)
                    .bind(lesson.is_free)
                    .bind(now)
                    .bind(lesson.id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to update lesson")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&lesson.name)
                    .bind(&content)
                    .bind(lesson.is_published)
                    .bind(lesson.is_free)
                    .bind(now)
                    .bind(lesson.id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to update lesson")?;
            }
        }

        Ok(Lesson {
            updated_at: now,
            ..lesson.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM lessons WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to delete lesson")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to delete lesson")?;
            }
        }
        Ok(())
    }

    async fn count_published(&self, course_id: i64) -> Result<i64> {
        let sql =
            "SELECT COUNT(*) AS count FROM lessons WHERE course_id = ? AND is_published = TRUE";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(course_id)
                .fetch_one(sqlite(&self.pool)?)
                .await
                .context("Failed to count published lessons")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(course_id)
                .fetch_one(mysql(&self.pool)?)
                .await
                .context("Failed to count published lessons")?
                .get("count"),
        };
        Ok(count)
    }
}

fn encode_content(lesson: &Lesson) -> Result<Option<String>> {
    lesson
        .content
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to encode lesson content")
}

fn decode_content(raw: Option<String>) -> Result<Option<serde_json::Value>> {
    raw.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("Invalid lesson content in database")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_lesson_sqlite(pool: &SqlitePool, lesson: &Lesson) -> Result<Lesson> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO lessons (course_id, slug, name, content, is_published, is_free, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(lesson.course_id)
    .bind(&lesson.slug)
    .bind(&lesson.name)
    .bind(encode_content(lesson)?)
    .bind(lesson.is_published)
    .bind(lesson.is_free)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create lesson")?;

    Ok(Lesson {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..lesson.clone()
    })
}

fn row_to_lesson_with_video_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<LessonWithVideo> {
    Ok(LessonWithVideo {
        lesson: Lesson {
            id: row.get("id"),
            course_id: row.get("course_id"),
            slug: row.get("slug"),
            name: row.get("name"),
            content: decode_content(row.get("content"))?,
            is_published: row.get("is_published"),
            is_free: row.get("is_free"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        video: row_to_video_sqlite(row, "video_")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_lesson_mysql(pool: &MySqlPool, lesson: &Lesson) -> Result<Lesson> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO lessons (course_id, slug, name, content, is_published, is_free, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(lesson.course_id)
    .bind(&lesson.slug)
    .bind(&lesson.name)
    .bind(encode_content(lesson)?)
    .bind(lesson.is_published)
    .bind(lesson.is_free)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create lesson")?;

    Ok(Lesson {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..lesson.clone()
    })
}

fn row_to_lesson_with_video_mysql(row: &sqlx::mysql::MySqlRow) -> Result<LessonWithVideo> {
    Ok(LessonWithVideo {
        lesson: Lesson {
            id: row.get("id"),
            course_id: row.get("course_id"),
            slug: row.get("slug"),
            name: row.get("name"),
            content: decode_content(row.get("content"))?,
            is_published: row.get("is_published"),
            is_free: row.get("is_free"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        video: row_to_video_mysql(row, "video_")?,
    })
}

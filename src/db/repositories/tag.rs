//! Tag repository
//!
//! - `TagRepository` trait defining the interface for tag data access
//! - `SqlxTagRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// All tags ordered by name
    async fn list(&self) -> Result<Vec<Tag>>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_tag_sqlite(sqlite(&self.pool)?, tag).await,
            DatabaseDriver::Mysql => create_tag_mysql(mysql(&self.pool)?, tag).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let sql = "SELECT id, slug, name, created_at FROM tags WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get tag by ID")?;
                Ok(row.as_ref().map(row_to_tag_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get tag by ID")?;
                Ok(row.as_ref().map(row_to_tag_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let sql = "SELECT id, slug, name, created_at FROM tags WHERE slug = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => find_tag_sqlite(sqlite(&self.pool)?, sql, slug).await,
            DatabaseDriver::Mysql => find_tag_mysql(mysql(&self.pool)?, sql, slug).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let sql = "SELECT id, slug, name, created_at FROM tags WHERE name = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => find_tag_sqlite(sqlite(&self.pool)?, sql, name).await,
            DatabaseDriver::Mysql => find_tag_mysql(mysql(&self.pool)?, sql, name).await,
        }
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        let sql = "SELECT id, slug, name, created_at FROM tags ORDER BY name ASC";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to list tags")?;
                Ok(rows.iter().map(row_to_tag_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to list tags")?;
                Ok(rows.iter().map(row_to_tag_mysql).collect())
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_tag_sqlite(pool: &SqlitePool, tag: &Tag) -> Result<Tag> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO tags (slug, name, created_at) VALUES (?, ?, ?)")
        .bind(&tag.slug)
        .bind(&tag.name)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_rowid(),
        slug: tag.slug.clone(),
        name: tag.name.clone(),
        created_at: now,
    })
}

async fn find_tag_sqlite(pool: &SqlitePool, sql: &str, key: &str) -> Result<Option<Tag>> {
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag")?;

    Ok(row.as_ref().map(row_to_tag_sqlite))
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_tag_mysql(pool: &MySqlPool, tag: &Tag) -> Result<Tag> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO tags (slug, name, created_at) VALUES (?, ?, ?)")
        .bind(&tag.slug)
        .bind(&tag.name)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_id() as i64,
        slug: tag.slug.clone(),
        name: tag.name.clone(),
        created_at: now,
    })
}

async fn find_tag_mysql(pool: &MySqlPool, sql: &str, key: &str) -> Result<Option<Tag>> {
    let row = sqlx::query(sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag")?;

    Ok(row.as_ref().map(row_to_tag_mysql))
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Tag {
    Tag {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_repo() -> SqlxTagRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxTagRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = setup_repo().await;
        let created = repo
            .create(&Tag::new("music".to_string(), "Music".to_string()))
            .await
            .unwrap();

        assert!(created.id > 0);
        assert_eq!(repo.get_by_id(created.id).await.unwrap().unwrap().name, "Music");
        assert_eq!(repo.get_by_slug("music").await.unwrap().unwrap().id, created.id);
        assert_eq!(repo.get_by_name("Music").await.unwrap().unwrap().id, created.id);
        assert!(repo.get_by_id(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let repo = setup_repo().await;
        repo.create(&Tag::new("design".to_string(), "Design".to_string()))
            .await
            .unwrap();

        let err = repo
            .create(&Tag::new("design-2".to_string(), "Design".to_string()))
            .await
            .unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_list_ordered_by_name() {
        let repo = setup_repo().await;
        for name in ["Marketing", "Business", "Design"] {
            repo.create(&Tag::new(name.to_lowercase(), name.to_string()))
                .await
                .unwrap();
        }

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Business", "Design", "Marketing"]);
    }
}

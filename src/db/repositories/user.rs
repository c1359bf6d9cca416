//! User repository
//!
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use crate::models::{ProfileInput, UpsertUserInput, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, external_id, email, name, image_url, bio, linkedin_url, x_url, \
     github_url, website, payment_customer_id, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert the user or refresh its identity fields, keyed on the external ID
    async fn upsert(&self, input: &UpsertUserInput) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by identity provider ID
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<User>>;

    /// Overwrite the teacher profile fields. Returns false if no such user.
    async fn update_profile(&self, id: i64, profile: &ProfileInput) -> Result<bool>;

    async fn set_payment_customer_id(&self, id: i64, customer_id: &str) -> Result<()>;

    /// Users with at least one published course, ordered by how many
    /// courses they teach (descending), paired with that count.
    async fn top_creators(&self, limit: i64) -> Result<Vec<(User, i64)>>;

    /// Number of courses taught by the user
    async fn course_count(&self, id: i64) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn upsert(&self, input: &UpsertUserInput) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => upsert_user_sqlite(sqlite(&self.pool)?, input).await,
            DatabaseDriver::Mysql => upsert_user_mysql(mysql(&self.pool)?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(sqlite(&self.pool)?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(mysql(&self.pool)?, id).await,
        }
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_external_id_sqlite(sqlite(&self.pool)?, external_id).await
            }
            DatabaseDriver::Mysql => {
                get_user_by_external_id_mysql(mysql(&self.pool)?, external_id).await
            }
        }
    }

    async fn update_profile(&self, id: i64, profile: &ProfileInput) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_profile_sqlite(sqlite(&self.pool)?, id, profile).await
            }
            DatabaseDriver::Mysql => update_profile_mysql(mysql(&self.pool)?, id, profile).await,
        }
    }

    async fn set_payment_customer_id(&self, id: i64, customer_id: &str) -> Result<()> {
        let sql = "UPDATE users SET payment_customer_id = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(customer_id)
                    .bind(now)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to set payment customer ID")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(customer_id)
                    .bind(now)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to set payment customer ID")?;
            }
        }
        Ok(())
    }

    async fn top_creators(&self, limit: i64) -> Result<Vec<(User, i64)>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => top_creators_sqlite(sqlite(&self.pool)?, limit).await,
            DatabaseDriver::Mysql => top_creators_mysql(mysql(&self.pool)?, limit).await,
        }
    }

    async fn course_count(&self, id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM courses WHERE teacher_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_one(sqlite(&self.pool)?)
                .await
                .context("Failed to count courses")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_one(mysql(&self.pool)?)
                .await
                .context("Failed to count courses")?
                .get("count"),
        };
        Ok(count)
    }
}

fn top_creators_sql() -> String {
    format!(
        r#"
        SELECT {cols}, (SELECT COUNT(*) FROM courses c WHERE c.teacher_id = users.id) AS course_count
        FROM users
        WHERE EXISTS (
            SELECT 1 FROM courses p WHERE p.teacher_id = users.id AND p.is_published = TRUE
        )
        ORDER BY course_count DESC, users.id ASC
        LIMIT ?
        "#,
        cols = USER_COLUMNS
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn upsert_user_sqlite(pool: &SqlitePool, input: &UpsertUserInput) -> Result<User> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (external_id, email, name, image_url, bio, created_at, updated_at)
        VALUES (?, ?, ?, ?, '', ?, ?)
        ON CONFLICT(external_id) DO UPDATE SET
            email = excluded.email,
            name = excluded.name,
            image_url = excluded.image_url,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&input.external_id)
    .bind(&input.email)
    .bind(&input.name)
    .bind(&input.image_url)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert user")?;

    get_user_by_external_id_sqlite(pool, &input.external_id)
        .await?
        .context("User missing after upsert")
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_external_id_sqlite(
    pool: &SqlitePool,
    external_id: &str,
) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE external_id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by external ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_profile_sqlite(pool: &SqlitePool, id: i64, profile: &ProfileInput) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET bio = ?, linkedin_url = ?, x_url = ?, github_url = ?, website = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&profile.bio)
    .bind(&profile.linked_in_url)
    .bind(&profile.x_url)
    .bind(&profile.github_url)
    .bind(&profile.website)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update profile")?;

    Ok(result.rows_affected() > 0)
}

async fn top_creators_sqlite(pool: &SqlitePool, limit: i64) -> Result<Vec<(User, i64)>> {
    let rows = sqlx::query(&top_creators_sql())
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list top creators")?;

    rows.iter()
        .map(|row| Ok((row_to_user_sqlite(row)?, row.get("course_count"))))
        .collect()
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        external_id: row.get("external_id"),
        email: row.get("email"),
        name: row.get("name"),
        image_url: row.get("image_url"),
        bio: row.get("bio"),
        linkedin_url: row.get("linkedin_url"),
        x_url: row.get("x_url"),
        github_url: row.get("github_url"),
        website: row.get("website"),
        payment_customer_id: row.get("payment_customer_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn upsert_user_mysql(pool: &MySqlPool, input: &UpsertUserInput) -> Result<User> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (external_id, email, name, image_url, bio, created_at, updated_at)
        VALUES (?, ?, ?, ?, '', ?, ?)
        ON DUPLICATE KEY UPDATE
            email = VALUES(email),
            name = VALUES(name),
            image_url = VALUES(image_url),
            updated_at = VALUES(updated_at)
        "#,
    )
    .bind(&input.external_id)
    .bind(&input.email)
    .bind(&input.name)
    .bind(&input.image_url)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert user")?;

    get_user_by_external_id_mysql(pool, &input.external_id)
        .await?
        .context("User missing after upsert")
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_external_id_mysql(
    pool: &MySqlPool,
    external_id: &str,
) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE external_id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(external_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by external ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_profile_mysql(pool: &MySqlPool, id: i64, profile: &ProfileInput) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET bio = ?, linkedin_url = ?, x_url = ?, github_url = ?, website = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&profile.bio)
    .bind(&profile.linked_in_url)
    .bind(&profile.x_url)
    .bind(&profile.github_url)
    .bind(&profile.website)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update profile")?;

    // MySQL reports changed rows, so an unchanged profile counts as found.
    if result.rows_affected() > 0 {
        return Ok(true);
    }
    Ok(get_user_by_id_mysql(pool, id).await?.is_some())
}

async fn top_creators_mysql(pool: &MySqlPool, limit: i64) -> Result<Vec<(User, i64)>> {
    let rows = sqlx::query(&top_creators_sql())
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list top creators")?;

    rows.iter()
        .map(|row| Ok((row_to_user_mysql(row)?, row.get("course_count"))))
        .collect()
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        external_id: row.get("external_id"),
        email: row.get("email"),
        name: row.get("name"),
        image_url: row.get("image_url"),
        bio: row.get("bio"),
        linkedin_url: row.get("linkedin_url"),
        x_url: row.get("x_url"),
        github_url: row.get("github_url"),
        website: row.get("website"),
        payment_customer_id: row.get("payment_customer_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxUserRepository::new(pool))
    }

    fn identity(external_id: &str, email: &str) -> UpsertUserInput {
        UpsertUserInput {
            external_id: external_id.to_string(),
            email: email.to_string(),
            name: Some("Test User".to_string()),
            image_url: None,
        }
    }

    async fn insert_course(pool: &DynDatabasePool, slug: &str, teacher_id: i64, published: bool) {
        let sqlite = pool.as_sqlite().unwrap();
        sqlx::query("INSERT OR IGNORE INTO tags (id, slug, name) VALUES (1, 'dev', 'Development')")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO courses (slug, name, description, price, is_published, teacher_id, tag_id) \
             VALUES (?, 'Name', 'Description', 10, ?, ?, 1)",
        )
        .bind(slug)
        .bind(published)
        .bind(teacher_id)
        .execute(sqlite)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_upsert_creates_then_refreshes() {
        let (_pool, repo) = setup().await;

        let created = repo.upsert(&identity("user_1", "old@example.com")).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.bio, "");

        repo.update_profile(created.id, &ProfileInput {
            bio: "Hello".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        let refreshed = repo.upsert(&identity("user_1", "new@example.com")).await.unwrap();
        assert_eq!(refreshed.id, created.id);
        assert_eq!(refreshed.email, "new@example.com");
        assert_eq!(refreshed.bio, "Hello");
    }

    #[tokio::test]
    async fn test_get_by_external_id() {
        let (_pool, repo) = setup().await;
        let created = repo.upsert(&identity("user_2", "a@example.com")).await.unwrap();

        let found = repo.get_by_external_id("user_2").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(repo.get_by_external_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_profile_missing_user() {
        let (_pool, repo) = setup().await;
        let updated = repo.update_profile(99, &ProfileInput::default()).await.unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_set_payment_customer_id() {
        let (_pool, repo) = setup().await;
        let user = repo.upsert(&identity("user_3", "c@example.com")).await.unwrap();

        repo.set_payment_customer_id(user.id, "cus_42").await.unwrap();

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.payment_customer_id.as_deref(), Some("cus_42"));
    }

    #[tokio::test]
    async fn test_top_creators_requires_published_course() {
        let (pool, repo) = setup().await;
        let busy = repo.upsert(&identity("busy", "busy@example.com")).await.unwrap();
        let quiet = repo.upsert(&identity("quiet", "quiet@example.com")).await.unwrap();
        let drafts = repo.upsert(&identity("drafts", "drafts@example.com")).await.unwrap();

        insert_course(&pool, "b1", busy.id, true).await;
        insert_course(&pool, "b2", busy.id, false).await;
        insert_course(&pool, "b3", busy.id, false).await;
        insert_course(&pool, "q1", quiet.id, true).await;
        insert_course(&pool, "d1", drafts.id, false).await;
        insert_course(&pool, "d2", drafts.id, false).await;

        let top = repo.top_creators(5).await.unwrap();
        let ids: Vec<(i64, i64)> = top.iter().map(|(u, n)| (u.id, *n)).collect();

        assert_eq!(ids, vec![(busy.id, 3), (quiet.id, 1)]);
        assert_eq!(repo.course_count(drafts.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_top_creators_respects_limit() {
        let (pool, repo) = setup().await;
        for i in 0..7 {
            let user = repo
                .upsert(&identity(&format!("t{}", i), &format!("t{}@example.com", i)))
                .await
                .unwrap();
            insert_course(&pool, &format!("course-{}", i), user.id, true).await;
        }

        assert_eq!(repo.top_creators(5).await.unwrap().len(), 5);
    }
}

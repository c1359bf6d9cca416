//! Enrollment repository
//!
//! Enrollment rows are keyed on (user_id, course_id); inserting an existing
//! pair is a no-op, so checkout reconciliation can run any number of times.

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Enrollment repository trait
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Enroll the user. Returns false if they were already enrolled.
    async fn enroll(&self, user_id: i64, course_id: i64) -> Result<bool>;

    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> Result<bool>;

    /// Remove an enrollment. Returns false if there was none.
    async fn remove(&self, user_id: i64, course_id: i64) -> Result<bool>;

    /// Number of students enrolled in the course
    async fn count_for_course(&self, course_id: i64) -> Result<i64>;

    async fn course_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>>;
}

/// SQLx-based enrollment repository implementation
pub struct SqlxEnrollmentRepository {
    pool: DynDatabasePool,
}

impl SqlxEnrollmentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EnrollmentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl EnrollmentRepository for SqlxEnrollmentRepository {
    async fn enroll(&self, user_id: i64, course_id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                "INSERT OR IGNORE INTO enrollments (user_id, course_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(course_id)
            .bind(now)
            .execute(sqlite(&self.pool)?)
            .await
            .context("Failed to enroll user")?
            .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(
                "INSERT IGNORE INTO enrollments (user_id, course_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(course_id)
            .bind(now)
            .execute(mysql(&self.pool)?)
            .await
            .context("Failed to enroll user")?
            .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> Result<bool> {
        let sql = "SELECT 1 AS found FROM enrollments WHERE user_id = ? AND course_id = ?";
        let found = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to check enrollment")?
                .is_some(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to check enrollment")?
                .is_some(),
        };
        Ok(found)
    }

    async fn remove(&self, user_id: i64, course_id: i64) -> Result<bool> {
        let sql = "DELETE FROM enrollments WHERE user_id = ? AND course_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(course_id)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to remove enrollment")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(course_id)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to remove enrollment")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count_for_course(&self, course_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM enrollments WHERE course_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(course_id)
                .fetch_one(sqlite(&self.pool)?)
                .await
                .context("Failed to count enrollments")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(course_id)
                .fetch_one(mysql(&self.pool)?)
                .await
                .context("Failed to count enrollments")?
                .get("count"),
        };
        Ok(count)
    }

    async fn course_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT course_id FROM enrollments WHERE user_id = ? ORDER BY created_at, course_id";
        let ids: Vec<i64> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(user_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list enrollments")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(user_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list enrollments")?,
        };
        Ok(ids)
    }
}

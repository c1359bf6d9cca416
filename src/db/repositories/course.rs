//! Course repository
//!
//! Courses are read either bare (`Course`) or joined with their teacher and
//! tag (`CourseSummary`), which is what every listing needs.

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use crate::models::{Course, CourseSummary, Tag, TeacherSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const COURSE_COLUMNS: &str =
    "id, slug, name, description, price, is_published, teacher_id, tag_id, created_at, updated_at";

const SUMMARY_SELECT: &str = r#"
    SELECT c.id AS id, c.slug AS slug, c.name AS name, c.description AS description,
           c.price AS price, c.is_published AS is_published, c.teacher_id AS teacher_id,
           c.tag_id AS tag_id, c.created_at AS created_at, c.updated_at AS updated_at,
           u.external_id AS teacher_external_id, u.name AS teacher_name,
           u.image_url AS teacher_image_url,
           t.slug AS tag_slug, t.name AS tag_name, t.created_at AS tag_created_at
    FROM courses c
    JOIN users u ON u.id = c.teacher_id
    JOIN tags t ON t.id = c.tag_id
"#;

/// Which courses a summary listing selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseFilter {
    /// Published courses only
    Published,
    /// Every course taught by the given user
    Teacher(i64),
    /// Courses the given user is enrolled in
    EnrolledBy(i64),
}

impl CourseFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            CourseFilter::Published => "WHERE c.is_published = TRUE",
            CourseFilter::Teacher(_) => "WHERE c.teacher_id = ?",
            CourseFilter::EnrolledBy(_) => {
                "WHERE EXISTS (SELECT 1 FROM enrollments e WHERE e.course_id = c.id AND e.user_id = ?)"
            }
        }
    }

    fn bound_id(&self) -> Option<i64> {
        match self {
            CourseFilter::Published => None,
            CourseFilter::Teacher(id) | CourseFilter::EnrolledBy(id) => Some(*id),
        }
    }

    fn sql(&self, limit: Option<i64>) -> String {
        let mut sql = format!(
            "{} {} ORDER BY c.created_at DESC, c.id DESC",
            SUMMARY_SELECT,
            self.where_clause()
        );
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        sql
    }
}

/// Course repository trait
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Insert a course; `id` and timestamps on the input are ignored
    async fn create(&self, course: &Course) -> Result<Course>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>>;

    /// Course joined with teacher and tag
    async fn get_summary_by_slug(&self, slug: &str) -> Result<Option<CourseSummary>>;

    /// Summaries matching `filter`, newest first
    async fn list(&self, filter: CourseFilter, limit: Option<i64>) -> Result<Vec<CourseSummary>>;

    /// Persist all mutable fields of `course`
    async fn update(&self, course: &Course) -> Result<Course>;

    async fn set_published(&self, id: i64, is_published: bool) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based course repository implementation
pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, course: &Course) -> Result<Course> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_course_sqlite(sqlite(&self.pool)?, course).await,
            DatabaseDriver::Mysql => create_course_mysql(mysql(&self.pool)?, course).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get course by ID")?;
                Ok(row.as_ref().map(row_to_course_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get course by ID")?;
                Ok(row.as_ref().map(row_to_course_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE slug = ?", COURSE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get course by slug")?;
                Ok(row.as_ref().map(row_to_course_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get course by slug")?;
                Ok(row.as_ref().map(row_to_course_mysql))
            }
        }
    }

    async fn get_summary_by_slug(&self, slug: &str) -> Result<Option<CourseSummary>> {
        let sql = format!("{} WHERE c.slug = ?", SUMMARY_SELECT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get course summary")?;
                Ok(row.as_ref().map(row_to_summary_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get course summary")?;
                Ok(row.as_ref().map(row_to_summary_mysql))
            }
        }
    }

    async fn list(&self, filter: CourseFilter, limit: Option<i64>) -> Result<Vec<CourseSummary>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_courses_sqlite(sqlite(&self.pool)?, filter, limit).await,
            DatabaseDriver::Mysql => list_courses_mysql(mysql(&self.pool)?, filter, limit).await,
        }
    }

    async fn update(&self, course: &Course) -> Result<Course> {
        let now = Utc::now();
        let sql = r#"
            UPDATE courses
            SET name = ?, description = ?, price = ?, tag_id = ?, is_published = ?, updated_at = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&course.name)
                    .bind(&course.description)
                    .bind(course.price)
                    .bind(course.tag_id)
                    .bind(course.is_published)
                    .bind(now)
                    .bind(course.id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to update course")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&course.name)
                    .bind(&course.description)
                    .bind(course.price)
                    .bind(course.tag_id)
                    .bind(course.is_published)
                    .bind(now)
                    .bind(course.id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to update course")?;
            }
        }

        Ok(Course {
            updated_at: now,
            ..course.clone()
        })
    }

    async fn set_published(&self, id: i64, is_published: bool) -> Result<()> {
        let sql = "UPDATE courses SET is_published = ?, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(is_published)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to set course published flag")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(is_published)
                    .bind(Utc::now())
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to set course published flag")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM courses WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to delete course")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to delete course")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_course_sqlite(pool: &SqlitePool, course: &Course) -> Result<Course> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO courses (slug, name, description, price, is_published, teacher_id, tag_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&course.slug)
    .bind(&course.name)
    .bind(&course.description)
    .bind(course.price)
    .bind(course.is_published)
    .bind(course.teacher_id)
    .bind(course.tag_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create course")?;

    Ok(Course {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..course.clone()
    })
}

async fn list_courses_sqlite(
    pool: &SqlitePool,
    filter: CourseFilter,
    limit: Option<i64>,
) -> Result<Vec<CourseSummary>> {
    let sql = filter.sql(limit);
    let mut query = sqlx::query(&sql);
    if let Some(id) = filter.bound_id() {
        query = query.bind(id);
    }
    if let Some(limit) = limit {
        query = query.bind(limit);
    }

    let rows = query.fetch_all(pool).await.context("Failed to list courses")?;
    Ok(rows.iter().map(row_to_summary_sqlite).collect())
}

fn row_to_course_sqlite(row: &sqlx::sqlite::SqliteRow) -> Course {
    Course {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        is_published: row.get("is_published"),
        teacher_id: row.get("teacher_id"),
        tag_id: row.get("tag_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_summary_sqlite(row: &sqlx::sqlite::SqliteRow) -> CourseSummary {
    let course = row_to_course_sqlite(row);
    CourseSummary {
        teacher: TeacherSummary {
            id: course.teacher_id,
            external_id: row.get("teacher_external_id"),
            name: row.get("teacher_name"),
            image_url: row.get("teacher_image_url"),
        },
        tag: Tag {
            id: course.tag_id,
            slug: row.get("tag_slug"),
            name: row.get("tag_name"),
            created_at: row.get("tag_created_at"),
        },
        course,
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_course_mysql(pool: &MySqlPool, course: &Course) -> Result<Course> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO courses (slug, name, description, price, is_published, teacher_id, tag_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&course.slug)
    .bind(&course.name)
    .bind(&course.description)
    .bind(course.price)
    .bind(course.is_published)
    .bind(course.teacher_id)
    .bind(course.tag_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create course")?;

    Ok(Course {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..course.clone()
    })
}

async fn list_courses_mysql(
    pool: &MySqlPool,
    filter: CourseFilter,
    limit: Option<i64>,
) -> Result<Vec<CourseSummary>> {
    let sql = filter.sql(limit);
    let mut query = sqlx::query(&sql);
    if let Some(id) = filter.bound_id() {
        query = query.bind(id);
    }
    if let Some(limit) = limit {
        query = query.bind(limit);
    }

    let rows = query.fetch_all(pool).await.context("Failed to list courses")?;
    Ok(rows.iter().map(row_to_summary_mysql).collect())
}

fn row_to_course_mysql(row: &sqlx::mysql::MySqlRow) -> Course {
    Course {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        is_published: row.get("is_published"),
        teacher_id: row.get("teacher_id"),
        tag_id: row.get("tag_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_summary_mysql(row: &sqlx::mysql::MySqlRow) -> CourseSummary {
    let course = row_to_course_mysql(row);
    CourseSummary {
        teacher: TeacherSummary {
            id: course.teacher_id,
            external_id: row.get("teacher_external_id"),
            name: row.get("teacher_name"),
            image_url: row.get("teacher_image_url"),
        },
        tag: Tag {
            id: course.tag_id,
            slug: row.get("tag_slug"),
            name: row.get("tag_name"),
            created_at: row.get("tag_created_at"),
        },
        course,
    }
}

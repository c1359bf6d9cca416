//! Database layer
//!
//! SQLite (default, single-file deployment) or MySQL, selected by
//! configuration and hidden behind the `DatabasePool` trait.
//!
//! ```ignore
//! use coursehub::config::DatabaseConfig;
//! use coursehub::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

use anyhow::{anyhow, Result};
use sqlx::{MySqlPool, SqlitePool};

/// The SQLite pool behind `pool`, or an error if another driver is configured.
pub(crate) fn sqlite(pool: &DynDatabasePool) -> Result<&SqlitePool> {
    pool.as_sqlite()
        .ok_or_else(|| anyhow!("Database pool is not SQLite"))
}

/// The MySQL pool behind `pool`, or an error if another driver is configured.
pub(crate) fn mysql(pool: &DynDatabasePool) -> Result<&MySqlPool> {
    pool.as_mysql()
        .ok_or_else(|| anyhow!("Database pool is not MySQL"))
}

/// Whether `err` is a unique-constraint violation on either backend.
pub(crate) fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .is_some_and(|db| db.is_unique_violation())
    })
}

//! Job record storage and the agent task queue.
//!
//! [`store::JobStore`] is the only shared mutable resource in the system.
//! Two implementations exist: [`memory::MemoryJobStore`] for single-process
//! deployments and tests, and [`repositories::PgJobStore`] backed by
//! PostgreSQL.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;
pub mod task_queue;

pub use memory::MemoryJobStore;
pub use repositories::PgJobStore;
pub use store::{JobFilter, JobStore, Mutation, Page, StoreError};
pub use task_queue::TaskQueue;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

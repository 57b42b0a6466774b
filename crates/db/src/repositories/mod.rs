//! PostgreSQL-backed stores.

pub mod job_repo;

pub use job_repo::PgJobStore;

use std::sync::Arc;

use lookgen_db::DbPool;
use lookgen_worker::{Scheduler, StatusService};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the scheduler and status service are handles over `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// Owns submission, cancellation and the agent task queue.
    pub scheduler: Scheduler,
    /// Read-only job status.
    pub status: StatusService,
    /// Database pool when running against PostgreSQL; `None` for the
    /// in-memory store.
    pub pool: Option<DbPool>,
    pub config: Arc<ServerConfig>,
}

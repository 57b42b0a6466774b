use axum::routing::get;
use axum::Router;

use crate::handlers::agent;
use crate::state::AppState;

/// Routes mounted at `/agent`.
///
/// ```text
/// GET    /tasks           -> list_tasks
/// POST   /tasks           -> enqueue_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/tasks", get(agent::list_tasks).post(agent::enqueue_task))
}

use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// Routes mounted at `/generation`.
///
/// ```text
/// POST   /async           -> submit_async
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/async", post(generation::submit_async))
}

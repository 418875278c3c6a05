pub mod files;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;
use crate::ws;

/// Build the `/api` route tree.
///
/// ```text
/// /download              submit a URL (POST)
/// /status/{id}           current job snapshot
/// /jobs/{id}/ws          WebSocket progress stream
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/download", post(jobs::submit))
        .route("/status/{id}", get(jobs::status))
        .route("/jobs/{id}/ws", get(ws::job_stream_handler))
}

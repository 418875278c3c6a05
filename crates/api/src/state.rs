use std::sync::Arc;

use reelfetch_worker::JobOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Job submission, status and progress streams.
    pub orchestrator: Arc<JobOrchestrator>,
    pub config: Arc<ServerConfig>,
}

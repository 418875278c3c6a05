//! Artifact downloads from the output root.

use std::path::Path;

use axum::http::header::CONTENT_DISPOSITION;
use axum::http::HeaderValue;
use axum::middleware;
use axum::response::Response;
use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// `GET /files/{*path}` serves `<download_dir>/{path}` as an attachment.
///
/// Paths escaping the directory are rejected by `ServeDir`.
pub fn router(download_dir: &Path) -> Router<AppState> {
    Router::new()
        .nest_service("/files", ServeDir::new(download_dir))
        .layer(middleware::map_response(as_attachment))
}

async fn as_attachment(mut response: Response) -> Response {
    if response.status().is_success() {
        response
            .headers_mut()
            .insert(CONTENT_DISPOSITION, HeaderValue::from_static("attachment"));
    }
    response
}

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use reelfetch_api::config::ServerConfig;
use reelfetch_api::router::build_app_router;
use reelfetch_api::state::AppState;
use reelfetch_core::job::JobStatus;
use reelfetch_core::types::JobId;
use reelfetch_fetcher::{EngineError, EngineEvent, FetchEngine, FetchOptions, ProgressSink};
use reelfetch_worker::{FetchConfig, JobOrchestrator};
use tempfile::TempDir;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

/// Engine that writes `<name>` into the output directory after one
/// progress event, or fails when the URL contains `fail`.
pub struct FakeEngine {
    pub name: String,
}

#[async_trait]
impl FetchEngine for FakeEngine {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        progress: ProgressSink,
    ) -> Result<PathBuf, EngineError> {
        if url.contains("fail") {
            return Err(EngineError::ExecutionFailed {
                exit_code: Some(1),
                message: "ERROR: Unsupported URL".into(),
            });
        }
        progress.emit(EngineEvent::Downloading {
            percent: "50%".into(),
            speed: String::new(),
            eta: String::new(),
        });
        progress.emit(EngineEvent::Finished);

        let dir = std::path::Path::new(&options.output_template)
            .parent()
            .map(std::path::Path::to_path_buf)
            .unwrap_or_default();
        let path = dir.join(&self.name);
        tokio::fs::write(&path, b"fake media").await?;
        Ok(path)
    }
}

pub struct TestApp {
    pub router: Router,
    pub orchestrator: Arc<JobOrchestrator>,
    pub dir: TempDir,
}

/// Build the full application router around a [`FakeEngine`] writing
/// `artifact_name`, using the same middleware stack as production.
pub fn build_test_app(artifact_name: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let orchestrator = Arc::new(JobOrchestrator::new(
        FetchConfig::with_download_dir(dir.path()),
        Arc::new(FakeEngine {
            name: artifact_name.to_string(),
        }),
    ));

    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        orchestrator,
        dir,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_form(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Poll until the job is terminal.
pub async fn wait_terminal(orchestrator: &JobOrchestrator, id: &JobId) -> JobStatus {
    for _ in 0..200 {
        let status = orchestrator.status(id).unwrap().status;
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} did not finish");
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelfetch_api::config::ServerConfig;
use reelfetch_api::router::build_app_router;
use reelfetch_api::state::AppState;
use reelfetch_fetcher::YtDlpEngine;
use reelfetch_worker::{FetchConfig, JobOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "reelfetch_api=debug,reelfetch_worker=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    let fetch_config = FetchConfig::from_env().context("Invalid fetch configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        download_dir = %fetch_config.download_dir.display(),
        allowed_domains = ?fetch_config.allowed_domains,
        "Loaded configuration",
    );

    tokio::fs::create_dir_all(&fetch_config.download_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create download directory {}",
                fetch_config.download_dir.display()
            )
        })?;

    // --- Job engine ---
    let engine = Arc::new(YtDlpEngine::new(fetch_config.ytdlp_path.clone()));
    let orchestrator = Arc::new(JobOrchestrator::new(fetch_config, engine));

    // --- App state ---
    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    let active = orchestrator.active_jobs();
    tracing::info!(active, "Server stopped accepting connections, draining jobs");
    if orchestrator
        .drain(Duration::from_secs(config.shutdown_timeout_secs))
        .await
    {
        tracing::info!("Graceful shutdown complete");
    } else {
        tracing::warn!(
            active = orchestrator.active_jobs(),
            "Shutdown timeout reached with jobs still running",
        );
    }

    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

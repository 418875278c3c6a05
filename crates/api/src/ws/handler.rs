use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use reelfetch_core::types::JobId;
use reelfetch_events::SnapshotStream;

use crate::error::AppResult;
use crate::state::AppState;

/// HTTP handler that upgrades the connection to a job's progress stream.
///
/// Unknown jobs are rejected with 404 before the upgrade headers are
/// looked at, so a plain GET on an unknown id is also a 404.
pub async fn job_stream_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let id = JobId::from(id);
    let snapshots = state.orchestrator.subscribe(&id)?;
    match ws {
        Ok(ws) => Ok(ws.on_upgrade(move |socket| forward_snapshots(socket, id, snapshots))),
        Err(rejection) => {
            tracing::debug!(job_id = %id, error = %rejection, "Progress stream upgrade rejected");
            Ok(rejection.into_response())
        }
    }
}

/// Push snapshots until the stream ends or the client goes away, then send
/// a close frame.
async fn forward_snapshots(socket: WebSocket, id: JobId, mut snapshots: SnapshotStream) {
    tracing::debug!(job_id = %id, "Progress stream connected");
    let (mut sink, mut inbound) = socket.split();

    loop {
        tokio::select! {
            snapshot = snapshots.next() => {
                let Some(snapshot) = snapshot else { break };
                let text = match serde_json::to_string(&snapshot) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(job_id = %id, error = %e, "Failed to encode snapshot");
                        break;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    tracing::debug!(job_id = %id, "Progress stream sink closed");
                    return;
                }
            }
            message = inbound.next() => match message {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(job_id = %id, "Progress stream closed by client");
                    return;
                }
                Some(Err(e)) => {
                    tracing::debug!(job_id = %id, error = %e, "WebSocket receive error");
                    return;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    tracing::debug!(job_id = %id, "Progress stream finished");
}

//! Handlers for job submission and status.

use axum::extract::{FromRequest, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use reelfetch_core::job::JobSnapshot;
use reelfetch_core::types::JobId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub job: JobSnapshot,
}

// ---------------------------------------------------------------------------
// POST /api/download
// ---------------------------------------------------------------------------

/// Validate the URL and start a job. Returns as soon as the job is queued.
///
/// The body is JSON, or a URL-encoded form when the request says so.
pub async fn submit(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<Json<SubmitResponse>> {
    let body = read_submit_request(request, &state).await?;
    let job_id = state.orchestrator.submit(&body.url)?;
    Ok(Json(SubmitResponse { ok: true, job_id }))
}

async fn read_submit_request(request: Request, state: &AppState) -> AppResult<SubmitRequest> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let Form(body) = Form::<SubmitRequest>::from_request(request, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(body)
    } else {
        let Json(body) = Json::<SubmitRequest>::from_request(request, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// GET /api/status/{id}
// ---------------------------------------------------------------------------

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    let job = state.orchestrator.status(&JobId::from(id))?;
    Ok(Json(StatusResponse { ok: true, job }))
}

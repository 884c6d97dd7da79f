//! Queued Job API Handlers
//!
//! Asynchronous front door: submissions are accepted immediately and
//! compiled by the queue worker while callers poll.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
};

use crate::api::artifacts::{pdf_response, read_artifact};
use crate::api::error::{ApiError, ApiResult};
use crate::api::upload::read_upload;
use crate::queue::QueueFrontDoor;
use crate::state::AppState;
use texforge_core::domain::job::JobRecord;
use texforge_core::dto::job::QueuedJob;

fn front_door(state: &AppState) -> ApiResult<&QueueFrontDoor> {
    state
        .queue
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Queue is disabled".to_string()))
}

/// POST /jobs
/// Queue an upload for compilation
pub async fn submit_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<QueuedJob>)> {
    let queue = front_door(&state)?;
    let upload = read_upload(multipart).await?;

    let accepted = queue.submit(upload).await?;
    tracing::info!("[{}] Queued", accepted.id);

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /jobs/{id}
/// Get the record of a queued job
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    tracing::debug!("Getting job: {}", id);

    let record = front_door(&state)?.status(&id).await?;
    Ok(Json(record))
}

/// GET /jobs/{id}/download
/// Download the PDF of a completed queued job
pub async fn download_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let path = front_door(&state)?.artifact(&id).await?;

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.pdf", id));
    let body = read_artifact(&path, "PDF not found, expired, or compilation failed").await?;
    Ok(pdf_response(&name, body))
}

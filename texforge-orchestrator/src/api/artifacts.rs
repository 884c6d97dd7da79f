//! Artifact API Handlers
//!
//! Serves published compile logs and PDFs by file name. Names are resolved
//! strictly inside the output directories; anything else is a bad request.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::path::Path as FsPath;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /logs/{name}
/// Fetch a job's compile log
pub async fn get_log(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let path = state
        .layout
        .resolve_log(&name)
        .ok_or_else(|| ApiError::BadRequest("Invalid file path".to_string()))?;

    let body = read_artifact(&path, "Log file not found").await?;
    Ok(([(header::CONTENT_TYPE, "text/plain")], body).into_response())
}

/// GET /files/{name}
/// Download a job's PDF
pub async fn get_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let path = state
        .layout
        .resolve_pdf(&name)
        .ok_or_else(|| ApiError::BadRequest("Invalid file path".to_string()))?;

    let body = read_artifact(&path, "File not found").await?;
    Ok(pdf_response(&name, body))
}

/// A PDF served as a download
pub fn pdf_response(name: &str, body: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", name);
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

/// Reads an artifact, mapping a missing file to 404
pub async fn read_artifact(path: &FsPath, not_found: &str) -> ApiResult<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(body) => Ok(body),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound(not_found.to_string()))
        }
        Err(e) => {
            tracing::error!("Failed to read {}: {}", path.display(), e);
            Err(ApiError::InternalError("Failed to read file".to_string()))
        }
    }
}

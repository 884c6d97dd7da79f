//! Compile API Handler
//!
//! Synchronous compilation: the request is held open until the job reaches a
//! terminal state.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};

use crate::api::error::ApiResult;
use crate::api::upload::read_upload;
use crate::state::AppState;
use texforge_core::domain::job::JobStatus;
use texforge_core::domain::result::CompileResult;

/// POST /compile
/// Compile an uploaded `.tex` file or ZIP archive
///
/// # Returns
/// 200 on success, 500 on a failed compile, 408 on timeout; all three carry
/// the compile result body
pub async fn compile(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<CompileResult>)> {
    let upload = read_upload(multipart).await?;
    tracing::debug!("Compile request for {:?}", upload.file_name);

    let outcome = state.dispatcher.dispatch(upload).await?;

    let status = match outcome.status {
        JobStatus::Completed => StatusCode::OK,
        JobStatus::TimedOut => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    Ok((status, Json(outcome.result)))
}

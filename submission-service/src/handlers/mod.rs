pub mod file_upload;
pub mod report;
pub mod validation;

use axum::http::StatusCode;
use shared::PipelineError;

/// Map a pipeline failure onto the response the client sees
pub fn error_response(err: PipelineError) -> (StatusCode, String) {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, "Request rejected");
    }
    (status, err.to_string())
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use super::error_response;
use crate::AppState;

/// `GET /report-summary/:sha256` - stored report body, verbatim
pub async fn report_summary(
    State(state): State<AppState>,
    Path(sha256): Path<String>,
) -> Result<String, (StatusCode, String)> {
    let report = state
        .lookup
        .get_by_str(&sha256)
        .await
        .map_err(error_response)?;

    Ok(report.body)
}

//! Parsing of Falcon Sandbox responses

use serde::Deserialize;

use crate::types::{ContentHash, JobId, JobState, JobStatus, PipelineError, PipelineResult};

/// `POST /submit/file` response (fields the pipeline reads)
#[derive(Debug, Deserialize)]
struct SubmitFileResponse {
    job_id: Option<String>,
    sha256: Option<String>,
}

/// `GET /report/{id}/summary` response (fields the pipeline reads)
#[derive(Debug, Deserialize)]
struct ReportSummaryResponse {
    state: Option<String>,
    sha256: Option<String>,
    verdict: Option<String>,
}

pub fn parse_submit_file(body: &str) -> PipelineResult<JobId> {
    let response: SubmitFileResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::Parse(format!("submit response is not JSON: {}", e)))?;

    tracing::debug!(sha256 = ?response.sha256, "Parsed submit response");

    let job_id = response
        .job_id
        .ok_or_else(|| PipelineError::Parse("submit response has no job_id".to_string()))?;
    JobId::new(job_id).map_err(|e| PipelineError::Parse(e.to_string()))
}

/// The raw body becomes the report; a terminal state must carry the sample's sha256.
pub fn parse_report_summary(body: &str) -> PipelineResult<JobStatus> {
    let response: ReportSummaryResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::Parse(format!("report summary is not JSON: {}", e)))?;

    let state = response
        .state
        .as_deref()
        .map(JobState::parse)
        .ok_or_else(|| PipelineError::Parse("report summary has no state".to_string()))?;

    let content_hash = match response.sha256.as_deref() {
        Some(sha256) if !sha256.is_empty() => Some(
            ContentHash::parse(sha256).map_err(|e| PipelineError::Parse(e.to_string()))?,
        ),
        _ => None,
    };

    if !state.is_pending() && content_hash.is_none() {
        return Err(PipelineError::Parse(format!(
            "terminal state {} without sha256",
            state
        )));
    }

    tracing::debug!(%state, verdict = ?response.verdict, "Parsed report summary");

    Ok(JobStatus {
        state,
        content_hash,
        report_body: body.to_string(),
    })
}

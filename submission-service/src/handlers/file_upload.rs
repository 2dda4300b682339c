use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use shared::Submission;

use super::error_response;
use super::validation::{decode_encoded_data, validate_file_size};
use crate::AppState;

/// JSON submission body: the whole file, base64 encoded
#[derive(Debug, Serialize, Deserialize)]
pub struct EncodedFileRequest {
    #[serde(rename = "encoded-data")]
    pub encoded_data: String,
}

/// Handle `POST /submit-file`; responds with the content hash
pub async fn submit_encoded_file(
    State(state): State<AppState>,
    Json(request): Json<EncodedFileRequest>,
) -> Result<String, (StatusCode, String)> {
    tracing::info!("Received encoded file submission");

    let data = decode_encoded_data(&request.encoded_data)?;
    validate_file_size(data.len(), state.max_file_size)?;

    let content_hash = state
        .ingestion
        .submit(Submission::new(data))
        .await
        .map_err(error_response)?;

    Ok(content_hash.to_string())
}

/// Handle `POST /submit/file` multipart upload; responds with the content hash
pub async fn submit_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<String, (StatusCode, String)> {
    tracing::info!("Received file submission request");

    let mut submission: Option<Submission> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("unknown").to_string();
        tracing::debug!("Processing field: {}", field_name);

        if field_name == "file" {
            let file_name = field.file_name().map(|s| s.to_string());

            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?
                .to_vec();

            validate_file_size(data.len(), state.max_file_size)?;

            let mut file = Submission::new(data);
            if let Some(name) = file_name {
                file = file.with_file_name(name);
            }
            submission = Some(file);
            break;
        }
    }

    let submission =
        submission.ok_or((StatusCode::BAD_REQUEST, "No file provided".to_string()))?;

    let content_hash = state
        .ingestion
        .submit(submission)
        .await
        .map_err(error_response)?;

    Ok(content_hash.to_string())
}

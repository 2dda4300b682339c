// Upload validation utilities

use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), (StatusCode, String)> {
    if size > max_size {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("File too large. Maximum size is {} MB", max_size / (1024 * 1024)),
        ));
    }
    if size == 0 {
        return Err((StatusCode::BAD_REQUEST, "Empty file provided".to_string()));
    }
    Ok(())
}

/// Decode the standard-alphabet base64 payload of a JSON submission.
/// Line breaks are ignored so wrapped `base64` output is accepted.
pub fn decode_encoded_data(encoded: &str) -> Result<Vec<u8>, (StatusCode, String)> {
    let unwrapped: String = encoded
        .trim()
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();
    STANDARD.decode(unwrapped).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("failed to decode with Base64; {}", e),
        )
    })
}

/// Largest request body accepted for a `max_size` file, allowing for base64 and multipart framing
pub fn request_body_limit(max_size: usize) -> usize {
    max_size / 3 * 4 + 4 + 64 * 1024
}

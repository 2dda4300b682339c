//! Error taxonomy for the submission pipeline

use thiserror::Error;

use super::ContentHash;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Blob missing for content hash {0}")]
    BlobMissing(ContentHash),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Sandbox submission failed: {0}")]
    Submission(String),

    #[error("Sandbox poll failed: {0}")]
    Poll(String),

    #[error("Malformed sandbox response: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            PipelineError::NotFound(_) => 404,
            PipelineError::InvalidInput(_) => 400,
            PipelineError::BackendUnavailable(_) => 503,
            PipelineError::Submission(_) | PipelineError::Poll(_) | PipelineError::Parse(_) => 502,
            PipelineError::BlobMissing(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::BackendUnavailable(_)
                | PipelineError::Submission(_)
                | PipelineError::Poll(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::NotFound(_))
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(err: redis::RedisError) -> Self {
        PipelineError::BackendUnavailable(err.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

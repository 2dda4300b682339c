//! Shared type definitions for the sandbox submission pipeline
//!
//! - Identifiers (content hash of a file, sandbox job identifier)
//! - Queue messages (scan and poll requests)
//! - Job state as reported by the sandbox
//! - Stored reports and ingestion input

pub mod error;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::hashing;
pub use error::{PipelineError, PipelineResult};

/// Length of a hex-encoded SHA-256 digest
pub const CONTENT_HASH_LEN: usize = 64;

/// Lower-case hex SHA-256 digest of a file's bytes; primary key for blobs and reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Digest of `data`. Deterministic for a given byte sequence.
    pub fn of(data: &[u8]) -> Self {
        Self(hashing::sha256(data))
    }

    /// Validate an externally supplied hash, normalizing it to lower-case.
    pub fn parse(value: &str) -> PipelineResult<Self> {
        let value = value.trim();
        if value.len() != CONTENT_HASH_LEN || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PipelineError::InvalidInput(format!(
                "content hash must be {} hex characters, got {:?}",
                CONTENT_HASH_LEN, value
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = PipelineError;

    fn try_from(value: String) -> PipelineResult<Self> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Opaque identifier the sandbox assigns to one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(value: impl Into<String>) -> PipelineResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::InvalidInput("job id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = PipelineError;

    fn try_from(value: String) -> PipelineResult<Self> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// "File ready to scan". Travels on the scan channel as the bare hash string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub content_hash: ContentHash,
}

impl ScanRequest {
    pub fn new(content_hash: ContentHash) -> Self {
        Self { content_hash }
    }

    pub fn encode(&self) -> String {
        self.content_hash.to_string()
    }

    pub fn decode(payload: &str) -> PipelineResult<Self> {
        let content_hash = ContentHash::parse(payload)
            .map_err(|e| PipelineError::Parse(format!("scan request payload: {}", e)))?;
        Ok(Self { content_hash })
    }
}

/// "Job ready to poll". Travels on the poll channel as the bare job id string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub job_id: JobId,
}

impl PollRequest {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }

    pub fn encode(&self) -> String {
        self.job_id.to_string()
    }

    pub fn decode(payload: &str) -> PipelineResult<Self> {
        let job_id = JobId::new(payload)
            .map_err(|e| PipelineError::Parse(format!("poll request payload: {}", e)))?;
        Ok(Self { job_id })
    }
}

/// Job state as observed through the sandbox status call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    InQueue,
    InProgress,
    /// Any other reported state, whatever the verdict.
    Terminal(String),
}

impl JobState {
    pub fn parse(state: &str) -> Self {
        match state.trim() {
            "IN_QUEUE" => JobState::InQueue,
            "IN_PROGRESS" => JobState::InProgress,
            other => JobState::Terminal(other.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::InQueue | JobState::InProgress)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::InQueue => "IN_QUEUE",
            JobState::InProgress => "IN_PROGRESS",
            JobState::Terminal(state) => state,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one status query against the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Echoed back by the sandbox; always present on terminal states.
    pub content_hash: Option<ContentHash>,
    /// Full response payload, stored verbatim as the report.
    pub report_body: String,
}

/// Final analysis report keyed by the analyzed file's content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub content_hash: ContentHash,
    pub body: String,
}

/// A file handed to the ingestion path.
#[derive(Debug, Clone)]
pub struct Submission {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl Submission {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { file_name: None, bytes }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Sandbox module: contract to the external malware analysis service
///
/// The pipeline only needs two calls: submit raw bytes for a job id, and
/// query a job id for its state. `HybridAnalysisClient` implements them over
/// the Falcon Sandbox v2 REST API.

pub mod hybrid_analysis;
pub mod parse;

pub use hybrid_analysis::HybridAnalysisClient;

use async_trait::async_trait;

use crate::types::{JobId, JobStatus, PipelineResult};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Start an analysis run. Any non-success response is a `Submission` error.
    async fn submit(&self, file_name: &str, data: &[u8]) -> PipelineResult<JobId>;

    /// Current state of a run. Non-success responses are `Poll` errors,
    /// unreadable payloads are `Parse` errors.
    async fn poll_status(&self, job_id: &JobId) -> PipelineResult<JobStatus>;
}

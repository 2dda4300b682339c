use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::messaging::{WorkQueue, WorkQueueExt};
use crate::sandbox::SandboxClient;
use crate::storage::{BlobStore, InFlightRegistry};
use crate::types::{JobId, PipelineError, PipelineResult, PollRequest, ScanRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A sandbox job was started and its first poll request published.
    Submitted(JobId),
    /// Another job for the same content is still running.
    AlreadyInFlight,
}

struct InFlightPolicy {
    registry: Arc<dyn InFlightRegistry>,
    ttl: Duration,
}

/// Hands stored files to the sandbox and starts polling.
pub struct ScanWorker {
    blobs: Arc<dyn BlobStore>,
    sandbox: Arc<dyn SandboxClient>,
    queue: Arc<dyn WorkQueue>,
    in_flight: Option<InFlightPolicy>,
}

impl ScanWorker {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        sandbox: Arc<dyn SandboxClient>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            blobs,
            sandbox,
            queue,
            in_flight: None,
        }
    }

    /// Skip submission while a marker for the same content is held.
    pub fn with_in_flight(mut self, registry: Arc<dyn InFlightRegistry>, ttl: Duration) -> Self {
        self.in_flight = Some(InFlightPolicy { registry, ttl });
        self
    }

    pub async fn handle(&self, request: &ScanRequest) -> PipelineResult<ScanOutcome> {
        let content_hash = &request.content_hash;
        info!(content_hash = %content_hash, "scan-work");

        let data = self.blobs.get_blob(content_hash).await.map_err(|e| match e {
            PipelineError::NotFound(_) => PipelineError::BlobMissing(content_hash.clone()),
            other => other,
        })?;

        if let Some(policy) = &self.in_flight {
            if !policy.registry.try_claim(content_hash, policy.ttl).await? {
                info!(content_hash = %content_hash, "Sandbox job already in flight, skipping");
                return Ok(ScanOutcome::AlreadyInFlight);
            }
        }

        let job_id = match self.sandbox.submit(content_hash.as_str(), &data).await {
            Ok(job_id) => job_id,
            Err(e) => {
                error!(content_hash = %content_hash, error = %e, "Sandbox submission failed");
                self.release_marker(request).await;
                return Err(e);
            }
        };
        info!(content_hash = %content_hash, job_id = %job_id, "Submitted to sandbox");

        if let Err(e) = self.queue.publish_poll(&PollRequest::new(job_id.clone())).await {
            error!(content_hash = %content_hash, job_id = %job_id, error = %e, "Failed to publish poll request, sandbox job orphaned");
            self.release_marker(request).await;
            return Err(e);
        }

        Ok(ScanOutcome::Submitted(job_id))
    }

    async fn release_marker(&self, request: &ScanRequest) {
        if let Some(policy) = &self.in_flight {
            if let Err(e) = policy.registry.release(&request.content_hash).await {
                warn!(content_hash = %request.content_hash, error = %e, "Failed to release in-flight marker");
            }
        }
    }
}

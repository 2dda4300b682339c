use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::messaging::{WorkQueue, WorkQueueExt};
use crate::sandbox::SandboxClient;
use crate::storage::{InFlightRegistry, ReportStore};
use crate::types::{ContentHash, JobState, PipelineError, PipelineResult, PollRequest, Report};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Job still pending; the same poll request was published again.
    Requeued(JobState),
    /// Terminal state reached and the report stored.
    Completed(ContentHash),
}

/// Polling state machine, one transition per delivered poll request.
///
/// Pending jobs are republished before `handle` returns, so a pending job
/// always has an outstanding poll request. Terminal states are absorbing.
pub struct PollWorker {
    sandbox: Arc<dyn SandboxClient>,
    reports: Arc<dyn ReportStore>,
    queue: Arc<dyn WorkQueue>,
    in_flight: Option<Arc<dyn InFlightRegistry>>,
    poll_delay: Duration,
}

impl PollWorker {
    pub fn new(
        sandbox: Arc<dyn SandboxClient>,
        reports: Arc<dyn ReportStore>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            sandbox,
            reports,
            queue,
            in_flight: None,
            poll_delay: Duration::ZERO,
        }
    }

    /// Release the content's in-flight marker once its report is written.
    pub fn with_in_flight(mut self, registry: Arc<dyn InFlightRegistry>) -> Self {
        self.in_flight = Some(registry);
        self
    }

    /// Wait this long before republishing a pending job.
    pub fn with_poll_delay(mut self, poll_delay: Duration) -> Self {
        self.poll_delay = poll_delay;
        self
    }

    pub async fn handle(&self, request: &PollRequest) -> PipelineResult<PollOutcome> {
        let job_id = &request.job_id;
        debug!(job_id = %job_id, "poll-work");

        let status = self.sandbox.poll_status(job_id).await?;

        if status.state.is_pending() {
            debug!(job_id = %job_id, state = %status.state, "Job pending, requeueing");
            if !self.poll_delay.is_zero() {
                tokio::time::sleep(self.poll_delay).await;
            }
            self.queue.publish_poll(request).await?;
            return Ok(PollOutcome::Requeued(status.state));
        }

        let content_hash = status.content_hash.ok_or_else(|| {
            PipelineError::Parse(format!("terminal state {} without sha256", status.state))
        })?;

        self.reports
            .put_report(&Report {
                content_hash: content_hash.clone(),
                body: status.report_body,
            })
            .await?;
        info!(job_id = %job_id, content_hash = %content_hash, state = %status.state, "Report stored");

        if let Some(registry) = &self.in_flight {
            if let Err(e) = registry.release(&content_hash).await {
                warn!(content_hash = %content_hash, error = %e, "Failed to release in-flight marker");
            }
        }

        Ok(PollOutcome::Completed(content_hash))
    }
}

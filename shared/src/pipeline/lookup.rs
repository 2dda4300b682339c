use std::sync::Arc;

use tracing::info;

use crate::storage::ReportStore;
use crate::types::{ContentHash, PipelineResult, Report};

/// Serves stored reports by content hash.
///
/// `NotFound` covers both "still running" and "never submitted".
#[derive(Clone)]
pub struct ReportLookup {
    reports: Arc<dyn ReportStore>,
}

impl ReportLookup {
    pub fn new(reports: Arc<dyn ReportStore>) -> Self {
        Self { reports }
    }

    pub async fn get(&self, content_hash: &ContentHash) -> PipelineResult<Report> {
        info!(content_hash = %content_hash, "report-summary");
        self.reports.get_report(content_hash).await
    }

    /// Validates a caller-supplied hash string before the lookup.
    pub async fn get_by_str(&self, content_hash: &str) -> PipelineResult<Report> {
        let content_hash = ContentHash::parse(content_hash)?;
        self.get(&content_hash).await
    }
}

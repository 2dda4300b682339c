use std::sync::Arc;

use tracing::info;

use crate::messaging::{WorkQueue, WorkQueueExt};
use crate::storage::BlobStore;
use crate::types::{ContentHash, PipelineError, PipelineResult, ScanRequest, Submission};

/// Accepts files: hash, store, enqueue a scan.
#[derive(Clone)]
pub struct IngestionService {
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn WorkQueue>,
}

impl IngestionService {
    pub fn new(blobs: Arc<dyn BlobStore>, queue: Arc<dyn WorkQueue>) -> Self {
        Self { blobs, queue }
    }

    /// Returns the content hash callers use to fetch the report later.
    ///
    /// Resubmitting identical bytes rewrites the same blob and publishes
    /// another scan request.
    pub async fn submit(&self, submission: Submission) -> PipelineResult<ContentHash> {
        if submission.bytes.is_empty() {
            return Err(PipelineError::InvalidInput("Empty file provided".to_string()));
        }

        let content_hash = ContentHash::of(&submission.bytes);
        info!(
            content_hash = %content_hash,
            file_name = ?submission.file_name,
            size = submission.bytes.len(),
            "submit-file"
        );

        self.blobs.put_blob(&content_hash, &submission.bytes).await?;
        self.queue
            .publish_scan(&ScanRequest::new(content_hash.clone()))
            .await?;

        Ok(content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{Channel, MemoryWorkQueue};
    use crate::storage::MemoryBlobStore;

    fn service() -> (IngestionService, Arc<MemoryBlobStore>, Arc<MemoryWorkQueue>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let queue = Arc::new(MemoryWorkQueue::new());
        (IngestionService::new(blobs.clone(), queue.clone()), blobs, queue)
    }

    #[tokio::test]
    async fn test_submit_stores_blob_and_enqueues_scan() {
        let (service, blobs, queue) = service();

        let hash = service.submit(Submission::new(b"hello".to_vec())).await.unwrap();

        assert_eq!(hash, ContentHash::of(b"hello"));
        assert_eq!(blobs.get_blob(&hash).await.unwrap(), b"hello".to_vec());
        assert_eq!(queue.ready(Channel::Scan), vec![hash.to_string()]);
    }

    #[tokio::test]
    async fn test_resubmission_republishes_scan() {
        let (service, blobs, queue) = service();

        let first = service
            .submit(Submission::new(b"same".to_vec()).with_file_name("a.exe"))
            .await
            .unwrap();
        let second = service
            .submit(Submission::new(b"same".to_vec()).with_file_name("b.exe"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(blobs.len().await, 1);
        assert_eq!(queue.ready(Channel::Scan).len(), 2);
    }

    #[tokio::test]
    async fn test_empty_submission_rejected() {
        let (service, blobs, queue) = service();

        let err = service.submit(Submission::new(Vec::new())).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(blobs.is_empty().await);
        assert!(queue.ready(Channel::Scan).is_empty());
    }
}

//! In-memory stores with the same semantics as the Redis ones.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{BlobStore, InFlightRegistry, ReportStore};
use crate::types::{ContentHash, PipelineError, PipelineResult, Report};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_blob(&self, hash: &ContentHash, data: &[u8]) -> PipelineResult<()> {
        self.entries.write().await.insert(hash.clone(), data.to_vec());
        Ok(())
    }

    async fn get_blob(&self, hash: &ContentHash) -> PipelineResult<Vec<u8>> {
        self.entries
            .read()
            .await
            .get(hash)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("blob {}", hash)))
    }
}

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    entries: RwLock<HashMap<ContentHash, String>>,
    writes: Mutex<usize>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of put_report calls, replays included.
    pub async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn put_report(&self, report: &Report) -> PipelineResult<()> {
        self.entries
            .write()
            .await
            .insert(report.content_hash.clone(), report.body.clone());
        *self.writes.lock().await += 1;
        Ok(())
    }

    async fn get_report(&self, hash: &ContentHash) -> PipelineResult<Report> {
        self.entries
            .read()
            .await
            .get(hash)
            .map(|body| Report {
                content_hash: hash.clone(),
                body: body.clone(),
            })
            .ok_or_else(|| PipelineError::NotFound(format!("report {}", hash)))
    }
}

#[derive(Debug, Default)]
pub struct MemoryInFlightRegistry {
    markers: Mutex<HashMap<ContentHash, Instant>>,
}

impl MemoryInFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_claimed(&self, hash: &ContentHash) -> bool {
        self.markers
            .lock()
            .await
            .get(hash)
            .is_some_and(|expires_at| *expires_at > Instant::now())
    }
}

#[async_trait]
impl InFlightRegistry for MemoryInFlightRegistry {
    async fn try_claim(&self, hash: &ContentHash, ttl: Duration) -> PipelineResult<bool> {
        let now = Instant::now();
        let mut markers = self.markers.lock().await;
        match markers.get(hash) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                markers.insert(hash.clone(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, hash: &ContentHash) -> PipelineResult<()> {
        self.markers.lock().await.remove(hash);
        Ok(())
    }
}

/// Storage module for file blobs and analysis reports
///
/// This module provides:
/// - Capability traits the pipeline depends on (blob store, report store, in-flight registry)
/// - Redis-backed implementations used by the services
/// - In-memory implementations for tests and single-process embedding

pub mod memory;
pub mod redis;

pub use self::memory::{MemoryBlobStore, MemoryInFlightRegistry, MemoryReportStore};
pub use self::redis::{RedisBlobStore, RedisInFlightRegistry, RedisReportStore};

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{ContentHash, PipelineResult, Report};

/// Content-addressed storage for raw file bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Unconditional upsert of `data` under `hash`.
    async fn put_blob(&self, hash: &ContentHash, data: &[u8]) -> PipelineResult<()>;

    /// Stored bytes, or `NotFound`.
    async fn get_blob(&self, hash: &ContentHash) -> PipelineResult<Vec<u8>>;
}

/// Storage for final analysis reports keyed by content hash.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Unconditional upsert; a replayed write overwrites the previous body.
    async fn put_report(&self, report: &Report) -> PipelineResult<()>;

    /// Stored report, or `NotFound`.
    async fn get_report(&self, hash: &ContentHash) -> PipelineResult<Report>;
}

/// Marks content hashes that already have a sandbox job running.
#[async_trait]
pub trait InFlightRegistry: Send + Sync {
    /// True if the marker was free and is now held for `ttl`.
    async fn try_claim(&self, hash: &ContentHash, ttl: Duration) -> PipelineResult<bool>;

    async fn release(&self, hash: &ContentHash) -> PipelineResult<()>;
}

/// Key builder for consistent key naming
pub struct KeyBuilder;

impl KeyBuilder {
    /// Blobs and reports live in separate logical databases under the bare hash.
    pub fn blob(hash: &ContentHash) -> String {
        hash.to_string()
    }

    pub fn report(hash: &ContentHash) -> String {
        hash.to_string()
    }

    pub fn in_flight(hash: &ContentHash) -> String {
        format!("inflight:{}", hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_naming() {
        let hash = ContentHash::of(b"hello");
        assert_eq!(KeyBuilder::blob(&hash), hash.as_str());
        assert_eq!(KeyBuilder::report(&hash), hash.as_str());
        assert_eq!(KeyBuilder::in_flight(&hash), format!("inflight:{}", hash));
    }
}

/// Redis-backed stores
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::{BlobStore, InFlightRegistry, KeyBuilder, ReportStore};
use crate::config::RedisConfig;
use crate::types::{ContentHash, PipelineError, PipelineResult, Report};

/// Open a managed connection to one logical database of the configured server
pub async fn connect(config: &RedisConfig, db: i64) -> PipelineResult<ConnectionManager> {
    let client = redis::Client::open(config.connection_info(db)?)?;
    let connection = ConnectionManager::new(client).await?;
    info!(db, "Connected to Redis");
    Ok(connection)
}

/// File bytes stored with plain SET/GET, no expiry
#[derive(Clone)]
pub struct RedisBlobStore {
    connection: ConnectionManager,
}

impl RedisBlobStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(config: &RedisConfig) -> PipelineResult<Self> {
        Ok(Self::new(connect(config, config.blob_db).await?))
    }
}

#[async_trait]
impl BlobStore for RedisBlobStore {
    async fn put_blob(&self, hash: &ContentHash, data: &[u8]) -> PipelineResult<()> {
        info!(content_hash = %hash, size = data.len(), "PutFile");
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(KeyBuilder::blob(hash), data).await?;
        Ok(())
    }

    async fn get_blob(&self, hash: &ContentHash) -> PipelineResult<Vec<u8>> {
        info!(content_hash = %hash, "GetFile");
        let mut conn = self.connection.clone();
        let data: Option<Vec<u8>> = conn.get(KeyBuilder::blob(hash)).await?;
        data.ok_or_else(|| PipelineError::NotFound(format!("blob {}", hash)))
    }
}

/// Report bodies stored verbatim as strings
#[derive(Clone)]
pub struct RedisReportStore {
    connection: ConnectionManager,
}

impl RedisReportStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(config: &RedisConfig) -> PipelineResult<Self> {
        Ok(Self::new(connect(config, config.report_db).await?))
    }
}

#[async_trait]
impl ReportStore for RedisReportStore {
    async fn put_report(&self, report: &Report) -> PipelineResult<()> {
        info!(content_hash = %report.content_hash, "PutReport");
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(KeyBuilder::report(&report.content_hash), report.body.as_str())
            .await?;
        Ok(())
    }

    async fn get_report(&self, hash: &ContentHash) -> PipelineResult<Report> {
        info!(content_hash = %hash, "GetReport");
        let mut conn = self.connection.clone();
        let body: Option<String> = conn.get(KeyBuilder::report(hash)).await?;
        body.map(|body| Report {
            content_hash: hash.clone(),
            body,
        })
        .ok_or_else(|| PipelineError::NotFound(format!("report {}", hash)))
    }
}

/// In-flight markers held with SET NX EX so an abandoned job eventually frees its hash
#[derive(Clone)]
pub struct RedisInFlightRegistry {
    connection: ConnectionManager,
}

impl RedisInFlightRegistry {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Markers share the report database
    pub async fn connect(config: &RedisConfig) -> PipelineResult<Self> {
        Ok(Self::new(connect(config, config.report_db).await?))
    }
}

#[async_trait]
impl InFlightRegistry for RedisInFlightRegistry {
    async fn try_claim(&self, hash: &ContentHash, ttl: Duration) -> PipelineResult<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(KeyBuilder::in_flight(hash))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        let claimed = reply.is_some();
        debug!(content_hash = %hash, claimed, "Claim in-flight marker");
        Ok(claimed)
    }

    async fn release(&self, hash: &ContentHash) -> PipelineResult<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(KeyBuilder::in_flight(hash)).await?;
        debug!(content_hash = %hash, "Released in-flight marker");
        Ok(())
    }
}

/// Work queue abstraction carrying scan and poll requests
///
/// Delivery semantics are at-least-once with competing consumers: each published
/// message is handed to exactly one receiver, stays pending until acknowledged,
/// and is redelivered by `recover` if its consumer never acknowledged it.
pub mod memory;
pub mod redis_queue;

pub use memory::MemoryWorkQueue;
pub use redis_queue::RedisWorkQueue;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{PipelineResult, PollRequest, ScanRequest};

/// The two logical topics of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Payload: content hash
    Scan,
    /// Payload: sandbox job id
    Poll,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Scan => "scan",
            Channel::Poll => "poll",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One handed-out message. Must be acknowledged once handling is decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Channel,
    pub payload: String,
    pub delivery_id: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a message to `channel`
    async fn publish(&self, channel: Channel, payload: &str) -> PipelineResult<()>;

    /// Wait up to `timeout` for the next message on `channel`
    async fn receive(&self, channel: Channel, timeout: Duration) -> PipelineResult<Option<Delivery>>;

    /// Mark a delivery done; it will never be redelivered
    async fn ack(&self, delivery: &Delivery) -> PipelineResult<()>;

    /// Requeue every received-but-unacknowledged delivery of `channel`
    async fn recover(&self, channel: Channel) -> PipelineResult<usize>;
}

/// Typed publishing helpers over any `WorkQueue`
#[async_trait]
pub trait WorkQueueExt: WorkQueue {
    async fn publish_scan(&self, request: &ScanRequest) -> PipelineResult<()> {
        self.publish(Channel::Scan, &request.encode()).await?;
        tracing::info!(content_hash = %request.content_hash, "Published scan request");
        Ok(())
    }

    async fn publish_poll(&self, request: &PollRequest) -> PipelineResult<()> {
        self.publish(Channel::Poll, &request.encode()).await?;
        tracing::info!(job_id = %request.job_id, "Published poll request");
        Ok(())
    }
}

impl<Q: WorkQueue + ?Sized> WorkQueueExt for Q {}

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use shared::messaging::RedisWorkQueue;
use shared::sandbox::HybridAnalysisClient;
use shared::storage::{RedisBlobStore, RedisInFlightRegistry, RedisReportStore};
use shared::{
    BlobStore, Channel, InFlightRegistry, PollRequest, PollWorker, ReportStore, SandboxClient,
    ScanOutcome, ScanRequest, ScanWorker, WorkQueue,
};

use super::consumer::{Consumer, ConsumerSettings, DeliveryHandler, HandlerError, HandlerResult};
use crate::config::Config;

/// Scan channel: stored file -> sandbox job -> first poll request
pub struct ScanHandler {
    worker: ScanWorker,
}

#[async_trait]
impl DeliveryHandler for ScanHandler {
    fn channel(&self) -> Channel {
        Channel::Scan
    }

    async fn handle(&self, payload: &str) -> HandlerResult {
        let request = ScanRequest::decode(payload).map_err(HandlerError::Undecodable)?;
        match self.worker.handle(&request).await.map_err(HandlerError::Failed)? {
            ScanOutcome::Submitted(job_id) => {
                debug!(content_hash = %request.content_hash, job_id = %job_id, "Scan delivery done")
            }
            ScanOutcome::AlreadyInFlight => {
                debug!(content_hash = %request.content_hash, "Scan delivery skipped")
            }
        }
        Ok(())
    }
}

/// Poll channel: one state machine transition per delivery
pub struct PollHandler {
    worker: PollWorker,
}

#[async_trait]
impl DeliveryHandler for PollHandler {
    fn channel(&self) -> Channel {
        Channel::Poll
    }

    async fn handle(&self, payload: &str) -> HandlerResult {
        let request = PollRequest::decode(payload).map_err(HandlerError::Undecodable)?;
        let outcome = self.worker.handle(&request).await.map_err(HandlerError::Failed)?;
        debug!(job_id = %request.job_id, ?outcome, "Poll delivery done");
        Ok(())
    }
}

/// Capabilities the workers are built from
#[derive(Clone)]
pub struct Dependencies {
    pub queue: Arc<dyn WorkQueue>,
    pub blobs: Arc<dyn BlobStore>,
    pub reports: Arc<dyn ReportStore>,
    pub in_flight: Arc<dyn InFlightRegistry>,
    pub sandbox: Arc<dyn SandboxClient>,
}

impl Dependencies {
    /// Redis stores and queue plus the Hybrid Analysis client
    pub async fn connect(config: &Config) -> Result<Self> {
        let queue = RedisWorkQueue::connect(&config.redis, config.queue.clone())
            .await
            .context("Failed to connect work queue")?;
        let blobs = RedisBlobStore::connect(&config.redis)
            .await
            .context("Failed to connect blob store")?;
        let reports = RedisReportStore::connect(&config.redis)
            .await
            .context("Failed to connect report store")?;
        let in_flight = RedisInFlightRegistry::connect(&config.redis)
            .await
            .context("Failed to connect in-flight registry")?;
        let sandbox = HybridAnalysisClient::new(config.sandbox.clone())?;

        Ok(Self {
            queue: Arc::new(queue),
            blobs: Arc::new(blobs),
            reports: Arc::new(reports),
            in_flight: Arc::new(in_flight),
            sandbox: Arc::new(sandbox),
        })
    }
}

/// One consumer per channel of the configured role
pub struct Worker {
    worker_id: String,
    consumers: Vec<Consumer>,
}

impl Worker {
    pub fn new(config: &Config, deps: Dependencies) -> Self {
        let worker_config = &config.worker;
        let settings = ConsumerSettings {
            max_concurrent: worker_config.max_concurrent,
            redeliver_failed: worker_config.redeliver_failed,
            receive_timeout: config.queue.receive_timeout(),
            ..ConsumerSettings::default()
        };

        let consumers = worker_config
            .role
            .channels()
            .into_iter()
            .map(|channel| {
                let handler: Arc<dyn DeliveryHandler> = match channel {
                    Channel::Scan => {
                        let mut worker = ScanWorker::new(
                            deps.blobs.clone(),
                            deps.sandbox.clone(),
                            deps.queue.clone(),
                        );
                        if worker_config.dedupe_in_flight {
                            worker = worker
                                .with_in_flight(deps.in_flight.clone(), worker_config.in_flight_ttl());
                        }
                        Arc::new(ScanHandler { worker })
                    }
                    Channel::Poll => {
                        let mut worker = PollWorker::new(
                            deps.sandbox.clone(),
                            deps.reports.clone(),
                            deps.queue.clone(),
                        )
                        .with_poll_delay(worker_config.poll_delay());
                        if worker_config.dedupe_in_flight {
                            worker = worker.with_in_flight(deps.in_flight.clone());
                        }
                        Arc::new(PollHandler { worker })
                    }
                };
                Consumer::new(deps.queue.clone(), handler, settings.clone())
            })
            .collect();

        info!(
            worker_id = %worker_config.worker_id,
            role = %worker_config.role,
            "Worker initialized successfully"
        );

        Self {
            worker_id: worker_config.worker_id.clone(),
            consumers,
        }
    }

    /// Run every consumer until shutdown, then wait for all of them to drain
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(worker_id = %self.worker_id, consumers = self.consumers.len(), "Starting worker");

        let mut consumers = JoinSet::new();
        for consumer in self.consumers {
            consumers.spawn(consumer.run(shutdown.clone()));
        }

        let mut result = Ok(());
        while let Some(joined) = consumers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(worker_id = %self.worker_id, error = %e, "Consumer failed");
                    result = Err(e);
                }
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Consumer task aborted");
                    result = Err(e.into());
                }
            }
        }

        info!(worker_id = %self.worker_id, "Worker stopped");
        result
    }
}

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Channel, Delivery, WorkQueue};
use crate::config::{QueueConfig, RedisConfig};
use crate::types::{PipelineError, PipelineResult};

/// Reliable queue over Redis lists.
///
/// Publish is LPUSH; receive is BLMOVE from the queue's right end into the
/// channel's processing list; ack is LREM from the processing list.
pub struct RedisWorkQueue {
    client: redis::Client,
    connection: ConnectionManager,
    config: QueueConfig,
}

impl RedisWorkQueue {
    pub async fn connect(redis_config: &RedisConfig, config: QueueConfig) -> PipelineResult<Self> {
        let client = redis::Client::open(redis_config.connection_info(redis_config.queue_db)?)?;
        let connection = ConnectionManager::new(client.clone()).await?;
        info!(
            scan_queue = %config.scan_queue,
            poll_queue = %config.poll_queue,
            "Connected work queue to Redis"
        );
        Ok(Self {
            client,
            connection,
            config,
        })
    }

    fn queue_key(&self, channel: Channel) -> &str {
        match channel {
            Channel::Scan => &self.config.scan_queue,
            Channel::Poll => &self.config.poll_queue,
        }
    }

    fn processing_key(&self, channel: Channel) -> String {
        format!("{}:processing", self.queue_key(channel))
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn publish(&self, channel: Channel, payload: &str) -> PipelineResult<()> {
        let mut conn = self.connection.clone();
        conn.lpush::<_, _, ()>(self.queue_key(channel), payload).await?;
        debug!(%channel, payload, "LPUSH");
        Ok(())
    }

    async fn receive(&self, channel: Channel, timeout: Duration) -> PipelineResult<Option<Delivery>> {
        // A blocking command would stall every caller sharing the managed
        // connection, so each receive gets its own.
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PipelineError::BackendUnavailable(format!("Failed to connect to Redis: {}", e)))?;

        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(self.queue_key(channel))
            .arg(self.processing_key(channel))
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(|e| PipelineError::BackendUnavailable(format!("BLMOVE failed: {}", e)))?;

        Ok(payload.map(|payload| Delivery {
            channel,
            payload,
            delivery_id: Uuid::new_v4().to_string(),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> PipelineResult<()> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn
            .lrem(self.processing_key(delivery.channel), 1, delivery.payload.as_str())
            .await?;
        if removed == 0 {
            warn!(
                channel = %delivery.channel,
                delivery_id = %delivery.delivery_id,
                "Acknowledged delivery was not pending (already recovered?)"
            );
        }
        Ok(())
    }

    async fn recover(&self, channel: Channel) -> PipelineResult<usize> {
        let mut conn = self.connection.clone();
        let processing = self.processing_key(channel);
        let mut recovered = 0;

        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(self.queue_key(channel))
                .arg("RIGHT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!(%channel, recovered, "Requeued unacknowledged deliveries");
        }
        Ok(recovered)
    }
}

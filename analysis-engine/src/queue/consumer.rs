use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use shared::{Channel, Delivery, PipelineError, WorkQueue};

/// Pause after a failed queue receive
pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload can never be handled; redelivery cannot help
    #[error("Undecodable payload: {0}")]
    Undecodable(PipelineError),

    #[error(transparent)]
    Failed(PipelineError),

    #[error("Handler panicked")]
    Panicked,
}

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Per-channel message handler driven by a `Consumer`
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    fn channel(&self) -> Channel;

    async fn handle(&self, payload: &str) -> HandlerResult;
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub max_concurrent: usize,
    pub redeliver_failed: bool,
    pub receive_timeout: Duration,
    pub error_backoff: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            redeliver_failed: false,
            receive_timeout: Duration::from_secs(5),
            error_backoff: RECEIVE_ERROR_BACKOFF,
        }
    }
}

/// Whether a finished delivery is acknowledged or left for `recover`
pub fn should_ack(result: &HandlerResult, redeliver_failed: bool) -> bool {
    match result {
        Ok(()) => true,
        Err(HandlerError::Undecodable(_)) => true,
        Err(HandlerError::Failed(_)) | Err(HandlerError::Panicked) => !redeliver_failed,
    }
}

/// Delivery loop for one channel with a bounded pool of handler tasks
pub struct Consumer {
    queue: Arc<dyn WorkQueue>,
    handler: Arc<dyn DeliveryHandler>,
    settings: ConsumerSettings,
}

impl Consumer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        handler: Arc<dyn DeliveryHandler>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            queue,
            handler,
            settings,
        }
    }

    pub fn channel(&self) -> Channel {
        self.handler.channel()
    }

    /// Run until `shutdown` flips, then wait for in-flight handlers
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let channel = self.channel();
        info!(%channel, max_concurrent = self.settings.max_concurrent, "Starting queue consumer");

        match self.queue.recover(channel).await {
            Ok(0) => {}
            Ok(recovered) => info!(%channel, recovered, "Requeued unacknowledged deliveries"),
            Err(e) => warn!(%channel, error = %e, "Failed to recover unacknowledged deliveries"),
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent));
        let mut tasks = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(channel, joined);
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => {
                    permit.context("Consumer semaphore closed")?
                }
            };

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.queue.receive(channel, self.settings.receive_timeout) => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    debug!(%channel, delivery_id = %delivery.delivery_id, "Received delivery");
                    let queue = self.queue.clone();
                    let handler = self.handler.clone();
                    let redeliver_failed = self.settings.redeliver_failed;
                    tasks.spawn(async move {
                        process_delivery(queue, handler, delivery, redeliver_failed).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    // Timeout, retry
                }
                Err(e) => {
                    error!(%channel, error = %e, "Failed to receive from queue");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.settings.error_backoff) => {}
                    }
                }
            }
        }

        info!(%channel, in_flight = tasks.len(), "Stopping queue consumer, draining in-flight deliveries");
        while let Some(joined) = tasks.join_next().await {
            log_join(channel, joined);
        }
        info!(%channel, "Queue consumer stopped");

        Ok(())
    }
}

async fn process_delivery(
    queue: Arc<dyn WorkQueue>,
    handler: Arc<dyn DeliveryHandler>,
    delivery: Delivery,
    redeliver_failed: bool,
) {
    let result = AssertUnwindSafe(handler.handle(&delivery.payload))
        .catch_unwind()
        .await
        .unwrap_or(Err(HandlerError::Panicked));

    match &result {
        Ok(()) => {}
        Err(HandlerError::Undecodable(e)) => {
            warn!(channel = %delivery.channel, payload = %delivery.payload, error = %e, "Dropping undecodable delivery")
        }
        Err(HandlerError::Failed(e)) => {
            error!(channel = %delivery.channel, payload = %delivery.payload, error = %e, retryable = e.is_retryable(), "Failed to handle delivery")
        }
        Err(e) => {
            error!(channel = %delivery.channel, payload = %delivery.payload, error = %e, "Failed to handle delivery")
        }
    }

    if should_ack(&result, redeliver_failed) {
        if let Err(e) = queue.ack(&delivery).await {
            error!(channel = %delivery.channel, delivery_id = %delivery.delivery_id, error = %e, "Failed to acknowledge delivery");
        }
    } else {
        warn!(channel = %delivery.channel, delivery_id = %delivery.delivery_id, "Delivery left unacknowledged for redelivery");
    }
}

fn log_join(channel: Channel, joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(%channel, error = %e, "Delivery task aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared::messaging::MemoryWorkQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::task::JoinHandle;

    /// Handler whose behavior is chosen by the payload text
    #[derive(Default)]
    struct ScriptedHandler {
        handled: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl ScriptedHandler {
        fn handled(&self) -> Vec<String> {
            self.handled.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryHandler for ScriptedHandler {
        fn channel(&self) -> Channel {
            Channel::Scan
        }

        async fn handle(&self, payload: &str) -> HandlerResult {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            if payload.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.handled.lock().unwrap().push(payload.to_string());

            match payload {
                "fail" => Err(HandlerError::Failed(PipelineError::Submission(
                    "sandbox unavailable".to_string(),
                ))),
                "garbage" => Err(HandlerError::Undecodable(PipelineError::Parse(
                    "bad payload".to_string(),
                ))),
                "panic" => panic!("handler blew up"),
                _ => Ok(()),
            }
        }
    }

    fn settings(redeliver_failed: bool) -> ConsumerSettings {
        ConsumerSettings {
            max_concurrent: 2,
            redeliver_failed,
            receive_timeout: Duration::from_millis(20),
            error_backoff: Duration::from_millis(20),
        }
    }

    fn start(
        queue: Arc<MemoryWorkQueue>,
        handler: Arc<ScriptedHandler>,
        settings: ConsumerSettings,
    ) -> (watch::Sender<bool>, JoinHandle<Result<()>>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = Consumer::new(queue, handler, settings);
        (shutdown_tx, tokio::spawn(consumer.run(shutdown_rx)))
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn stop(shutdown_tx: watch::Sender<bool>, handle: JoinHandle<Result<()>>) {
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_ack_policy() {
        let failed: HandlerResult = Err(HandlerError::Failed(PipelineError::Poll("x".to_string())));
        let undecodable: HandlerResult =
            Err(HandlerError::Undecodable(PipelineError::Parse("x".to_string())));

        assert!(should_ack(&Ok(()), true));
        assert!(should_ack(&failed, false));
        assert!(!should_ack(&failed, true));
        assert!(should_ack(&undecodable, true));
        assert!(!should_ack(&Err(HandlerError::Panicked), true));
    }

    #[tokio::test]
    async fn test_successful_delivery_is_acked() {
        let queue = Arc::new(MemoryWorkQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        queue.publish(Channel::Scan, "ok").await.unwrap();

        let (shutdown_tx, handle) = start(queue.clone(), handler.clone(), settings(false));
        wait_until(|| handler.handled().len() == 1 && queue.outstanding(Channel::Scan) == 0).await;
        stop(shutdown_tx, handle).await;

        assert_eq!(handler.handled(), vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_dropped_by_default() {
        let queue = Arc::new(MemoryWorkQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        queue.publish(Channel::Scan, "fail").await.unwrap();
        queue.publish(Channel::Scan, "ok").await.unwrap();

        let (shutdown_tx, handle) = start(queue.clone(), handler.clone(), settings(false));
        wait_until(|| handler.handled().len() == 2 && queue.outstanding(Channel::Scan) == 0).await;
        stop(shutdown_tx, handle).await;

        // the loop keeps consuming after a failure
        assert!(handler.handled().contains(&"ok".to_string()));
    }

    #[tokio::test]
    async fn test_failed_delivery_kept_for_redelivery() {
        let queue = Arc::new(MemoryWorkQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        queue.publish(Channel::Scan, "fail").await.unwrap();

        let (shutdown_tx, handle) = start(queue.clone(), handler.clone(), settings(true));
        wait_until(|| handler.handled().len() == 1).await;
        wait_until(|| queue.pending(Channel::Scan) == 1).await;
        stop(shutdown_tx, handle).await;

        assert_eq!(queue.recover(Channel::Scan).await.unwrap(), 1);
        assert_eq!(queue.ready(Channel::Scan), vec!["fail".to_string()]);
    }

    #[tokio::test]
    async fn test_undecodable_delivery_always_acked() {
        let queue = Arc::new(MemoryWorkQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        queue.publish(Channel::Scan, "garbage").await.unwrap();

        let (shutdown_tx, handle) = start(queue.clone(), handler.clone(), settings(true));
        wait_until(|| handler.handled().len() == 1 && queue.outstanding(Channel::Scan) == 0).await;
        stop(shutdown_tx, handle).await;
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_loop() {
        let queue = Arc::new(MemoryWorkQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        queue.publish(Channel::Scan, "panic").await.unwrap();
        queue.publish(Channel::Scan, "ok").await.unwrap();

        let (shutdown_tx, handle) = start(queue.clone(), handler.clone(), settings(true));
        wait_until(|| handler.handled().contains(&"ok".to_string())).await;
        wait_until(|| queue.pending(Channel::Scan) == 1).await;
        stop(shutdown_tx, handle).await;
    }

    #[tokio::test]
    async fn test_unacked_deliveries_recovered_on_start() {
        let queue = Arc::new(MemoryWorkQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        queue.publish(Channel::Scan, "orphan").await.unwrap();
        // a previous consumer took it and died
        queue
            .receive(Channel::Scan, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        let (shutdown_tx, handle) = start(queue.clone(), handler.clone(), settings(false));
        wait_until(|| handler.handled() == vec!["orphan".to_string()]).await;
        wait_until(|| queue.outstanding(Channel::Scan) == 0).await;
        stop(shutdown_tx, handle).await;
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let queue = Arc::new(MemoryWorkQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        for i in 0..6 {
            queue.publish(Channel::Scan, &format!("slow-{}", i)).await.unwrap();
        }

        let (shutdown_tx, handle) = start(queue.clone(), handler.clone(), settings(false));
        wait_until(|| handler.handled().len() == 6).await;
        stop(shutdown_tx, handle).await;

        let max_running = handler.max_running.load(Ordering::SeqCst);
        assert!(max_running >= 1 && max_running <= 2, "max running was {}", max_running);
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_handlers() {
        let queue = Arc::new(MemoryWorkQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        queue.publish(Channel::Scan, "slow").await.unwrap();

        let (shutdown_tx, handle) = start(queue.clone(), handler.clone(), settings(false));
        wait_until(|| handler.running.load(Ordering::SeqCst) == 1).await;
        stop(shutdown_tx, handle).await;

        assert_eq!(handler.handled(), vec!["slow".to_string()]);
        assert_eq!(queue.outstanding(Channel::Scan), 0);
    }
}

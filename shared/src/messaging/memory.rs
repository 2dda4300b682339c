//! In-process work queue with the same delivery semantics as the Redis one.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Channel, Delivery, WorkQueue};
use crate::types::{PipelineError, PipelineResult};

#[derive(Debug, Default)]
struct QueueState {
    ready: HashMap<Channel, VecDeque<String>>,
    pending: HashMap<String, Delivery>,
}

#[derive(Debug, Default)]
pub struct MemoryWorkQueue {
    state: Mutex<QueueState>,
    scan_ready: Notify,
    poll_ready: Notify,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, channel: Channel) -> &Notify {
        match channel {
            Channel::Scan => &self.scan_ready,
            Channel::Poll => &self.poll_ready,
        }
    }

    fn lock(&self) -> PipelineResult<std::sync::MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| PipelineError::BackendUnavailable("memory queue lock poisoned".to_string()))
    }

    fn try_take(&self, channel: Channel) -> PipelineResult<Option<Delivery>> {
        let mut state = self.lock()?;
        let Some(payload) = state.ready.get_mut(&channel).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        let delivery = Delivery {
            channel,
            payload,
            delivery_id: Uuid::new_v4().to_string(),
        };
        state.pending.insert(delivery.delivery_id.clone(), delivery.clone());
        Ok(Some(delivery))
    }

    /// Payloads waiting on `channel`, oldest first
    pub fn ready(&self, channel: Channel) -> Vec<String> {
        self.lock()
            .map(|state| {
                state
                    .ready
                    .get(&channel)
                    .map(|queue| queue.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Deliveries of `channel` handed out but not yet acknowledged
    pub fn pending(&self, channel: Channel) -> usize {
        self.lock()
            .map(|state| state.pending.values().filter(|d| d.channel == channel).count())
            .unwrap_or_default()
    }

    /// Ready plus pending messages of `channel`
    pub fn outstanding(&self, channel: Channel) -> usize {
        self.ready(channel).len() + self.pending(channel)
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn publish(&self, channel: Channel, payload: &str) -> PipelineResult<()> {
        self.lock()?
            .ready
            .entry(channel)
            .or_default()
            .push_back(payload.to_string());
        self.notify(channel).notify_one();
        Ok(())
    }

    async fn receive(&self, channel: Channel, timeout: Duration) -> PipelineResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify(channel).notified();
            if let Some(delivery) = self.try_take(channel)? {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_take(channel);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> PipelineResult<()> {
        self.lock()?.pending.remove(&delivery.delivery_id);
        Ok(())
    }

    async fn recover(&self, channel: Channel) -> PipelineResult<usize> {
        let recovered = {
            let mut state = self.lock()?;
            let ids: Vec<String> = state
                .pending
                .values()
                .filter(|d| d.channel == channel)
                .map(|d| d.delivery_id.clone())
                .collect();
            for id in &ids {
                if let Some(delivery) = state.pending.remove(id) {
                    state.ready.entry(channel).or_default().push_front(delivery.payload);
                }
            }
            ids.len()
        };
        for _ in 0..recovered {
            self.notify(channel).notify_one();
        }
        Ok(recovered)
    }
}

//! Scheduling loop: select, transmit, sleep, repeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use beacon_common::config::AppConfig;

use crate::queue::{DeliveryQueue, QueueError};

/// Pauses between loop iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerIntervals {
    pub send: Duration,
    pub failure: Duration,
    pub idle: Duration,
}

impl SchedulerIntervals {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            send: config.pager_send_interval(),
            failure: config.pager_failure_interval(),
            idle: config.pager_idle_interval(),
        }
    }
}

/// Result of one scheduling step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Sent(Uuid),
    Failed { message_id: Uuid, reason: String },
    /// Another consumer sent or is sending the selected message
    Skipped(Uuid),
    Idle,
}

pub struct DeliveryScheduler {
    queue: Arc<DeliveryQueue>,
    transport_key: String,
    intervals: SchedulerIntervals,
}

impl DeliveryScheduler {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        transport_key: impl Into<String>,
        intervals: SchedulerIntervals,
    ) -> Self {
        Self {
            queue,
            transport_key: transport_key.into(),
            intervals,
        }
    }

    /// Pick the next eligible message and send it once.
    ///
    /// Transmission failures are reported as [`TickOutcome::Failed`] and
    /// messages lost to another consumer as [`TickOutcome::Skipped`]; store
    /// errors are returned.
    pub async fn tick(&self) -> Result<TickOutcome, QueueError> {
        let Some(mut message) = self.queue.next_message_to_send(&self.transport_key).await? else {
            return Ok(TickOutcome::Idle);
        };

        match self.queue.send(&mut message).await {
            Ok(()) => Ok(TickOutcome::Sent(message.id)),
            Err(QueueError::Transmit(e)) => Ok(TickOutcome::Failed {
                message_id: message.id,
                reason: e.to_string(),
            }),
            Err(QueueError::AlreadySent(id) | QueueError::Claimed(id)) => Ok(TickOutcome::Skipped(id)),
            Err(e) => Err(e),
        }
    }

    /// Run until `stop` flips to true or its sender is dropped.
    ///
    /// The stop signal is checked between ticks and interrupts the sleeps; a
    /// send in progress always completes first.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> Result<(), QueueError> {
        tracing::info!(
            transport_key = %self.transport_key,
            retry_limit = self.queue.policy().retry_limit,
            max_age_secs = self.queue.policy().max_age.num_seconds(),
            "Delivery scheduler started"
        );

        while !*stop.borrow() {
            let pause = match self.tick().await? {
                TickOutcome::Sent(_) | TickOutcome::Skipped(_) => self.intervals.send,
                TickOutcome::Failed { message_id, reason } => {
                    tracing::debug!(%message_id, %reason, "Backing off after failed transmission");
                    self.intervals.failure
                }
                TickOutcome::Idle => self.intervals.idle,
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(transport_key = %self.transport_key, "Delivery scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventSink;
    use crate::policy::DeliveryPolicy;
    use crate::queue::testing::ScriptedTransmitter;
    use crate::store::{Claim, MemoryPagerStore, PagerMessageStore};
    use async_trait::async_trait;
    use beacon_common::error::AppError;
    use beacon_common::types::{PagerMessage, Priority};
    use chrono::{DateTime, Utc};

    fn intervals() -> SchedulerIntervals {
        SchedulerIntervals {
            send: Duration::from_millis(1),
            failure: Duration::from_millis(1),
            idle: Duration::from_millis(1),
        }
    }

    fn scheduler(
        store: Arc<MemoryPagerStore>,
        transmitter: ScriptedTransmitter,
    ) -> DeliveryScheduler {
        let queue = DeliveryQueue::new(
            store,
            Arc::new(transmitter),
            Arc::new(MemoryEventSink::new()),
            DeliveryPolicy::new(2, chrono::Duration::hours(1)),
        );
        DeliveryScheduler::new(Arc::new(queue), "pager", intervals())
    }

    #[tokio::test]
    async fn test_tick_outcomes() {
        let store = Arc::new(MemoryPagerStore::new());
        let message = PagerMessage::queued("pager", "42", "hello", Priority::Normal, Utc::now());
        store.insert(&message).await.unwrap();
        let scheduler = scheduler(store.clone(), ScriptedTransmitter::failing(1));

        assert!(matches!(
            scheduler.tick().await.unwrap(),
            TickOutcome::Failed { message_id, .. } if message_id == message.id
        ));
        assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Sent(message.id));
        assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Idle);
    }

    /// Keeps handing out the copy it was built with, like a read that raced a second consumer.
    struct StaleSelection {
        inner: MemoryPagerStore,
        stale: PagerMessage,
    }

    #[async_trait]
    impl PagerMessageStore for StaleSelection {
        async fn insert(&self, message: &PagerMessage) -> Result<(), AppError> {
            self.inner.insert(message).await
        }

        async fn next_eligible(
            &self,
            _transport_key: &str,
            _now: DateTime<Utc>,
            _policy: &DeliveryPolicy,
        ) -> Result<Option<PagerMessage>, AppError> {
            Ok(Some(self.stale.clone()))
        }

        async fn claim(
            &self,
            id: Uuid,
            now: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> Result<Claim, AppError> {
            self.inner.claim(id, now, until).await
        }

        async fn mark_sent(&self, id: Uuid) -> Result<bool, AppError> {
            self.inner.mark_sent(id).await
        }

        async fn record_failed_attempt(&self, id: Uuid) -> Result<i32, AppError> {
            self.inner.record_failed_attempt(id).await
        }
    }

    #[tokio::test]
    async fn test_message_taken_by_another_consumer_is_skipped() {
        let now = Utc::now();
        let message = PagerMessage::queued("pager", "42", "hello", Priority::Normal, now);
        let store = Arc::new(StaleSelection {
            inner: MemoryPagerStore::new(),
            stale: message.clone(),
        });
        store.insert(&message).await.unwrap();
        let transmitter = Arc::new(ScriptedTransmitter::default());
        let queue = DeliveryQueue::new(
            store.clone(),
            transmitter.clone(),
            Arc::new(MemoryEventSink::new()),
            DeliveryPolicy::new(2, chrono::Duration::hours(1)),
        );
        let scheduler = DeliveryScheduler::new(Arc::new(queue), "pager", intervals());

        store
            .claim(message.id, now, now + chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Skipped(message.id));

        store.mark_sent(message.id).await.unwrap();
        assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Skipped(message.id));
        assert_eq!(transmitter.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_message_goes_idle() {
        let store = Arc::new(MemoryPagerStore::new());
        let message = PagerMessage::queued("pager", "42", "hello", Priority::Normal, Utc::now());
        store.insert(&message).await.unwrap();
        let scheduler = scheduler(store.clone(), ScriptedTransmitter::failing(10));

        scheduler.tick().await.unwrap();
        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Idle);
        assert_eq!(store.get(message.id).unwrap().attempted_to_send, 2);
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops() {
        let store = Arc::new(MemoryPagerStore::new());
        for body in ["one", "two", "three"] {
            let message = PagerMessage::queued("pager", "42", body, Priority::Normal, Utc::now());
            store.insert(&message).await.unwrap();
        }
        let scheduler = Arc::new(scheduler(store.clone(), ScriptedTransmitter::failing(1)));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(stop_rx).await }
        });

        for _ in 0..200 {
            if store.snapshot().iter().all(|m| m.sent) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert!(store.snapshot().iter().all(|m| m.sent));
    }

    #[tokio::test]
    async fn test_run_returns_when_sender_dropped() {
        let store = Arc::new(MemoryPagerStore::new());
        let scheduler = scheduler(store, ScriptedTransmitter::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        drop(stop_tx);

        tokio::time::timeout(Duration::from_secs(1), scheduler.run(stop_rx))
            .await
            .unwrap()
            .unwrap();
    }
}

//! Delivery event sinks.
//!
//! Publishing is best effort: a sink that cannot deliver an event logs the
//! failure and the queue carries on. The sent flag in the store remains the
//! source of truth.

use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use beacon_common::types::DeliveryEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DeliveryEvent);
}

/// Publishes events as JSON on a Redis pub/sub channel.
#[derive(Clone)]
pub struct RedisEventSink {
    redis: ConnectionManager,
    channel: String,
}

impl RedisEventSink {
    pub fn new(redis: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            redis,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl EventSink for RedisEventSink {
    async fn publish(&self, event: DeliveryEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(message_id = %event.message_id(), error = %e, "Failed to serialize delivery event");
                return;
            }
        };

        let mut redis = self.redis.clone();
        match redis.publish::<_, _, i64>(&self.channel, payload).await {
            Ok(receivers) => {
                tracing::debug!(
                    message_id = %event.message_id(),
                    channel = %self.channel,
                    receivers,
                    "Delivery event published"
                );
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %event.message_id(),
                    channel = %self.channel,
                    error = %e,
                    "Failed to publish delivery event"
                );
            }
        }
    }
}

/// Writes events to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: DeliveryEvent) {
        match &event {
            DeliveryEvent::Transmitted {
                message_id,
                transport_key,
                cap_code,
                ..
            } => {
                tracing::info!(%message_id, %transport_key, %cap_code, "Page transmitted");
            }
            DeliveryEvent::TransmissionFailed {
                message_id,
                transport_key,
                cap_code,
                attempts,
                reason,
                ..
            } => {
                tracing::error!(
                    %message_id,
                    %transport_key,
                    %cap_code,
                    attempts,
                    %reason,
                    "Page failed permanently"
                );
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DeliveryEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn publish(&self, event: DeliveryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

//! Delivery queue for one paging transport.
//!
//! A message is either `Queued` or `Sent`. A failed transmission bumps the
//! attempt counter and leaves the message queued; the policy stops selecting it
//! once retries are exhausted or it ages out. Every send claims the stored row
//! first, so the caller's copy of a message is never trusted on its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use beacon_common::error::AppError;
use beacon_common::types::{DeliveryEvent, PagerMessage};

use crate::events::EventSink;
use crate::policy::DeliveryPolicy;
use crate::store::{Claim, PagerMessageStore};
use crate::transmitter::{TransmitError, Transmitter};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Transmit(#[from] TransmitError),

    #[error(transparent)]
    Store(#[from] AppError),

    #[error("pager message {0} was already sent")]
    AlreadySent(Uuid),

    #[error("pager message {0} is being sent by another consumer")]
    Claimed(Uuid),
}

pub struct DeliveryQueue {
    store: Arc<dyn PagerMessageStore>,
    transmitter: Arc<dyn Transmitter>,
    events: Arc<dyn EventSink>,
    policy: DeliveryPolicy,
}

impl DeliveryQueue {
    pub fn new(
        store: Arc<dyn PagerMessageStore>,
        transmitter: Arc<dyn Transmitter>,
        events: Arc<dyn EventSink>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            store,
            transmitter,
            events,
            policy,
        }
    }

    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Oldest eligible message for `transport_key`, if any.
    pub async fn next_message_to_send(
        &self,
        transport_key: &str,
    ) -> Result<Option<PagerMessage>, QueueError> {
        self.next_message_to_send_at(transport_key, Utc::now()).await
    }

    pub async fn next_message_to_send_at(
        &self,
        transport_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PagerMessage>, QueueError> {
        Ok(self.store.next_eligible(transport_key, now, &self.policy).await?)
    }

    /// Transmit `message` once.
    ///
    /// On success the message is marked sent and a `Transmitted` event is
    /// published. On a transmitter failure the attempt is recorded and the
    /// error returned; `TransmissionFailed` is published only on the attempt
    /// that reaches the retry limit. `message` is updated to match the store.
    ///
    /// Nothing is transmitted when the stored row is already sent
    /// ([`QueueError::AlreadySent`]) or claimed by another consumer
    /// ([`QueueError::Claimed`]).
    pub async fn send(&self, message: &mut PagerMessage) -> Result<(), QueueError> {
        if message.sent {
            return Err(QueueError::AlreadySent(message.id));
        }

        let now = Utc::now();
        match self
            .store
            .claim(message.id, now, self.policy.claim_expiry(now))
            .await?
        {
            Claim::Acquired => {}
            Claim::AlreadySent => {
                tracing::debug!(message_id = %message.id, "Stored message already sent");
                message.sent = true;
                return Err(QueueError::AlreadySent(message.id));
            }
            Claim::Busy => {
                tracing::debug!(message_id = %message.id, "Message claimed by another consumer");
                return Err(QueueError::Claimed(message.id));
            }
        }

        match self.transmitter.transmit(&message.cap_code, &message.body).await {
            Ok(()) => {
                if !self.store.mark_sent(message.id).await? {
                    // Only possible once our claim expired mid-transmission.
                    tracing::warn!(message_id = %message.id, "Message was already marked sent");
                }
                message.sent = true;

                tracing::info!(
                    message_id = %message.id,
                    transport_key = %message.transport_key,
                    cap_code = %message.cap_code,
                    "Page transmitted"
                );
                self.events
                    .publish(DeliveryEvent::Transmitted {
                        message_id: message.id,
                        transport_key: message.transport_key.clone(),
                        cap_code: message.cap_code.clone(),
                        at: Utc::now(),
                    })
                    .await;
                Ok(())
            }
            Err(error) => {
                let attempts = self.store.record_failed_attempt(message.id).await?;
                message.attempted_to_send = attempts;

                tracing::warn!(
                    message_id = %message.id,
                    attempts,
                    retry_limit = self.policy.retry_limit,
                    error = %error,
                    "Transmission failed"
                );

                if attempts == self.policy.retry_limit {
                    self.events
                        .publish(DeliveryEvent::TransmissionFailed {
                            message_id: message.id,
                            transport_key: message.transport_key.clone(),
                            cap_code: message.cap_code.clone(),
                            attempts,
                            reason: error.to_string(),
                            at: Utc::now(),
                        })
                        .await;
                }

                Err(error.into())
            }
        }
    }
}

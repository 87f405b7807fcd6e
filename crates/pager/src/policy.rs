//! Eligibility policy for the delivery queue.

use chrono::{DateTime, Duration, Utc};

use beacon_common::config::AppConfig;
use beacon_common::error::AppError;
use beacon_common::types::PagerMessage;

/// How long a consumer holds a message it is transmitting, unless configured.
pub const DEFAULT_CLAIM_TTL: Duration = Duration::minutes(5);

/// Retry and age bounds applied when selecting the next message to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// A message with this many failed attempts is never selected again
    pub retry_limit: i32,
    /// A message this old (or older) is never selected again
    pub max_age: Duration,
    /// Lifetime of a send claim; an expired claim frees the message for another consumer
    pub claim_ttl: Duration,
}

impl DeliveryPolicy {
    pub fn new(retry_limit: i32, max_age: Duration) -> Self {
        Self {
            retry_limit,
            max_age,
            claim_ttl: DEFAULT_CLAIM_TTL,
        }
    }

    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    /// Build the policy from configuration, rejecting ages `chrono` cannot represent.
    ///
    /// The claim outlives one full transmission attempt by a minute.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let max_age = i64::try_from(config.pager_max_age_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "PAGER_MAX_AGE_SECS={} is out of range",
                    config.pager_max_age_secs
                ))
            })?;

        let claim_ttl = i64::try_from(config.pager_transmit_timeout_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|timeout| timeout.checked_add(&Duration::minutes(1)))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "PAGER_TRANSMIT_TIMEOUT_MS={} is out of range",
                    config.pager_transmit_timeout_ms
                ))
            })?;

        Ok(Self::new(config.pager_retry_limit, max_age).with_claim_ttl(claim_ttl))
    }

    /// Oldest `queued_at` that is still eligible is strictly after this instant.
    ///
    /// `None` when the cutoff falls before the earliest representable time, in
    /// which case age excludes nothing.
    pub fn age_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.max_age)
    }

    /// Expiry of a claim taken at `now`.
    pub fn claim_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.claim_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_eligible(&self, message: &PagerMessage, now: DateTime<Utc>) -> bool {
        !message.sent
            && message.attempted_to_send < self.retry_limit
            && self
                .age_cutoff(now)
                .is_none_or(|cutoff| message.queued_at > cutoff)
    }
}

//! Paging transport: the addressing side of the delivery queue.
//!
//! Queueing a message here only writes a [`PagerMessage`] row. The scheduler
//! for the same transport key picks it up and transmits it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use beacon_addressing::{Recipient, Transport, TransportConfiguration, TransportError};
use beacon_common::types::{Message, PagerMessage};

use crate::store::PagerMessageStore;
use crate::transmitter::validate_field;

/// Longest body the paging network accepts in one page.
pub const DEFAULT_MAX_BODY_LEN: usize = 240;

/// Vendor payload of a paging transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PagerSettings {
    pub cap_code: String,
}

impl PagerSettings {
    pub fn from_configuration(
        transport_key: &str,
        configuration: &TransportConfiguration,
    ) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::InvalidPayload {
            transport_key: transport_key.to_string(),
            reason,
        };

        let settings: Self =
            serde_json::from_value(configuration.payload.clone()).map_err(|e| invalid(e.to_string()))?;
        validate_field("cap code", &settings.cap_code).map_err(|e| invalid(e.to_string()))?;
        if settings.cap_code.is_empty() {
            return Err(invalid("cap_code is empty".to_string()));
        }
        Ok(settings)
    }
}

pub struct PagerTransport {
    key: String,
    store: Arc<dyn PagerMessageStore>,
    accepting: AtomicBool,
    max_body_len: usize,
}

impl PagerTransport {
    pub fn new(key: impl Into<String>, store: Arc<dyn PagerMessageStore>) -> Self {
        Self {
            key: key.into(),
            store,
            accepting: AtomicBool::new(true),
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }

    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    /// Stop or resume taking new messages. Already queued messages are unaffected.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Relaxed);
        tracing::info!(transport_key = %self.key, accepting, "Pager transport intake changed");
    }

    fn body_fits(&self, body: &str) -> bool {
        !body.is_empty() && body.len() <= self.max_body_len && validate_field("body", body).is_ok()
    }
}

#[async_trait]
impl Transport for PagerTransport {
    fn key(&self) -> &str {
        &self.key
    }

    fn accepts_new_messages(&self) -> bool {
        self.accepting.load(Ordering::Relaxed)
    }

    fn can_send_to(&self, _recipient: &Recipient, message: &Message) -> bool {
        self.body_fits(&message.body)
    }

    async fn queue_message(
        &self,
        recipient: &Recipient,
        configuration: &TransportConfiguration,
        message: &Message,
    ) -> Result<(), TransportError> {
        let settings = PagerSettings::from_configuration(&self.key, configuration)?;
        if !self.body_fits(&message.body) {
            return Err(TransportError::Rejected {
                transport_key: self.key.clone(),
                reason: format!(
                    "body must be 1..={} printable ASCII characters",
                    self.max_body_len
                ),
            });
        }

        let pager_message = PagerMessage::queued(
            self.key.clone(),
            settings.cap_code,
            message.body.clone(),
            message.priority,
            Utc::now(),
        );
        self.store.insert(&pager_message).await?;

        tracing::info!(
            pager_message_id = %pager_message.id,
            message_id = %message.id,
            recipient = %recipient.name,
            cap_code = %pager_message.cap_code,
            "Page queued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPagerStore;
    use beacon_addressing::{RecipientId, RecipientType};
    use beacon_common::types::Priority;

    fn person() -> Recipient {
        Recipient::new(RecipientId::generate(), "alice", RecipientType::Person)
    }

    fn configuration(payload: serde_json::Value) -> TransportConfiguration {
        TransportConfiguration::new("pager", 10).with_payload(payload)
    }

    #[test]
    fn test_can_send_to_checks_body() {
        let transport = PagerTransport::new("pager", Arc::new(MemoryPagerStore::new())).with_max_body_len(10);
        let alice = person();

        assert!(transport.can_send_to(&alice, &Message::new("short", Priority::Normal)));
        assert!(!transport.can_send_to(&alice, &Message::new("much too long for it", Priority::Normal)));
        assert!(!transport.can_send_to(&alice, &Message::new("", Priority::Normal)));
        assert!(!transport.can_send_to(&alice, &Message::new("gr\u{fc}n", Priority::Normal)));
    }

    #[test]
    fn test_intake_toggle() {
        let transport = PagerTransport::new("pager", Arc::new(MemoryPagerStore::new()));
        assert!(transport.accepts_new_messages());
        transport.set_accepting(false);
        assert!(!transport.accepts_new_messages());
    }

    #[tokio::test]
    async fn test_queue_message_inserts_row() {
        let store = Arc::new(MemoryPagerStore::new());
        let transport = PagerTransport::new("pager", store.clone());
        let message = Message::new("db failover", Priority::Critical);

        transport
            .queue_message(&person(), &configuration(serde_json::json!({"cap_code": "1234567"})), &message)
            .await
            .unwrap();

        let rows = store.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cap_code, "1234567");
        assert_eq!(rows[0].body, "db failover");
        assert_eq!(rows[0].priority, Priority::Critical);
        assert_eq!(rows[0].attempted_to_send, 0);
        assert!(!rows[0].sent);
    }

    #[tokio::test]
    async fn test_queue_message_rejects_bad_payload() {
        let store = Arc::new(MemoryPagerStore::new());
        let transport = PagerTransport::new("pager", store.clone());
        let message = Message::new("db failover", Priority::Critical);

        for payload in [serde_json::json!({}), serde_json::json!({"cap_code": ""})] {
            let err = transport
                .queue_message(&person(), &configuration(payload), &message)
                .await
                .unwrap_err();
            assert!(matches!(err, TransportError::InvalidPayload { .. }));
        }
        assert!(store.snapshot().is_empty());
    }
}

//! Transport port and registry.
//!
//! A transport is one delivery channel implementation. Resolution only asks
//! the synchronous questions (`accepts_new_messages`, `can_send_to`); queueing
//! happens afterwards through the dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use beacon_common::error::AppError;
use beacon_common::types::Message;

use crate::configuration::TransportConfiguration;
use crate::recipient::Recipient;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid configuration payload for transport '{transport_key}': {reason}")]
    InvalidPayload {
        transport_key: String,
        reason: String,
    },

    #[error("message rejected by transport '{transport_key}': {reason}")]
    Rejected {
        transport_key: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] AppError),
}

/// A delivery channel that can accept messages for recipients.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registry key, matched against `TransportConfiguration::transport_key`.
    fn key(&self) -> &str;

    /// Whether the transport takes new messages right now.
    fn accepts_new_messages(&self) -> bool;

    /// Capability check for a recipient/message pair.
    fn can_send_to(&self, recipient: &Recipient, message: &Message) -> bool;

    /// Accept `message` for `recipient` through `configuration`.
    async fn queue_message(
        &self,
        recipient: &Recipient,
        configuration: &TransportConfiguration,
        message: &Message,
    ) -> Result<(), TransportError>;
}

/// Transports available to the resolver, keyed by transport key.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport under its own key, replacing any previous one.
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        let key = transport.key().to_string();
        if self.transports.insert(key.clone(), transport).is_some() {
            tracing::warn!(transport_key = %key, "Replaced registered transport");
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.register(transport);
        self
    }

    pub fn transport_with_key(&self, key: &str) -> Option<Arc<dyn Transport>> {
        self.transports.get(key).cloned()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.transports.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubTransport;
    use super::*;

    #[test]
    fn test_lookup_by_key() {
        let registry = TransportRegistry::new()
            .with_transport(StubTransport::new("sms"))
            .with_transport(StubTransport::new("pager"));

        assert!(registry.transport_with_key("pager").is_some());
        assert!(registry.transport_with_key("email").is_none());
        assert_eq!(registry.keys(), vec!["pager", "sms"]);
    }
}

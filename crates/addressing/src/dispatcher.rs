//! Notification dispatcher: hands resolved selections to their transports.
//!
//! Each selected transport is asked to queue the message for its recipient.
//! A failure for one delivery is recorded and never stops the others.

use serde::Serialize;
use uuid::Uuid;

use beacon_common::types::Message;

use crate::recipient::{RecipientId, RecipientRepository};
use crate::result::AddressingResult;

/// A delivery a transport accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedDelivery {
    pub recipient_id: RecipientId,
    pub configuration_id: Uuid,
    pub transport_key: String,
}

/// A delivery that could not be queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub recipient_id: RecipientId,
    pub configuration_id: Uuid,
    pub transport_key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub queued: Vec<QueuedDelivery>,
    pub failures: Vec<DispatchFailure>,
}

pub struct NotificationDispatcher;

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Queue `message` on every selected transport of every result.
    pub async fn dispatch<R>(
        &self,
        repository: &R,
        results: &[AddressingResult],
        message: &Message,
    ) -> DispatchReport
    where
        R: RecipientRepository + Sync + ?Sized,
    {
        let mut report = DispatchReport::default();

        for result in results {
            let Some(recipient) = repository.recipient(result.recipient_id) else {
                for selected in &result.selected {
                    report.failures.push(DispatchFailure {
                        recipient_id: result.recipient_id,
                        configuration_id: selected.configuration.id,
                        transport_key: selected.configuration.transport_key.clone(),
                        reason: "recipient no longer exists".to_string(),
                    });
                }
                continue;
            };

            for selected in &result.selected {
                let outcome = selected
                    .transport
                    .queue_message(recipient, &selected.configuration, message)
                    .await;

                match outcome {
                    Ok(()) => {
                        tracing::info!(
                            recipient_id = %result.recipient_id,
                            transport_key = %selected.configuration.transport_key,
                            message_id = %message.id,
                            "Message queued"
                        );
                        report.queued.push(QueuedDelivery {
                            recipient_id: result.recipient_id,
                            configuration_id: selected.configuration.id,
                            transport_key: selected.configuration.transport_key.clone(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            recipient_id = %result.recipient_id,
                            transport_key = %selected.configuration.transport_key,
                            error = %e,
                            "Transport refused message"
                        );
                        report.failures.push(DispatchFailure {
                            recipient_id: result.recipient_id,
                            configuration_id: selected.configuration.id,
                            transport_key: selected.configuration.transport_key.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::configuration::TransportConfiguration;
    use crate::context::ConstantExpressionEvaluator;
    use crate::recipient::RecipientGraph;
    use crate::resolver::RecipientResolver;
    use crate::transport::TransportRegistry;
    use crate::transport::testing::StubTransport;
    use beacon_common::types::Priority;

    #[tokio::test]
    async fn test_failures_do_not_stop_other_deliveries() {
        let pager = StubTransport::new("pager");
        let registry = Arc::new(TransportRegistry::new().with_transport(pager.clone()));
        let resolver = RecipientResolver::new(registry, Arc::new(ConstantExpressionEvaluator));

        let mut graph = RecipientGraph::new();
        let group = graph.add_group("ops");
        let alice = graph.add_person("alice");
        let bob = graph.add_person("bob");
        graph.add_member(group, alice).unwrap();
        graph.add_member(group, bob).unwrap();
        graph
            .add_configuration(
                alice,
                TransportConfiguration::new("pager", 10).with_payload(serde_json::json!({"reject": true})),
            )
            .unwrap();
        let bob_config = TransportConfiguration::new("pager", 10);
        let bob_config_id = bob_config.id;
        graph.add_configuration(bob, bob_config).unwrap();

        let message = Message::new("deploy failed", Priority::Normal);
        let results = resolver.resolve(&graph, &[group], &message).unwrap();
        let report = NotificationDispatcher::new()
            .dispatch(&graph, &results, &message)
            .await;

        assert_eq!(report.queued.len(), 1);
        assert_eq!(report.queued[0].recipient_id, bob);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].recipient_id, alice);
        assert_eq!(*pager.queued.lock().unwrap(), vec![(bob, bob_config_id)]);
    }
}

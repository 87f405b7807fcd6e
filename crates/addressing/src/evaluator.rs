//! Transport configuration evaluator: picks the eligible transports of one recipient.
//!
//! For each recipient:
//! 1. Order its configurations by rank, highest first (stable on ties)
//! 2. Skip disabled configurations and transports that are not accepting
//! 3. Evaluate the selection expression and the transport's capability check
//! 4. Stop early when a matching configuration is exclusive

use std::sync::Arc;

use beacon_common::types::Message;

use crate::configuration::TransportConfiguration;
use crate::context::{EvaluationContext, SelectionExpressionEvaluator};
use crate::recipient::Recipient;
use crate::result::{AddressingError, EvaluationOutcome, SelectedTransport};
use crate::transport::TransportRegistry;

/// Evaluates a recipient's own configurations. No hierarchy expansion happens here.
#[derive(Clone)]
pub struct TransportConfigurationEvaluator {
    registry: Arc<TransportRegistry>,
    expressions: Arc<dyn SelectionExpressionEvaluator>,
}

impl TransportConfigurationEvaluator {
    pub fn new(
        registry: Arc<TransportRegistry>,
        expressions: Arc<dyn SelectionExpressionEvaluator>,
    ) -> Self {
        Self {
            registry,
            expressions,
        }
    }

    pub fn evaluate(
        &self,
        recipient: &Recipient,
        context: &EvaluationContext,
        message: &Message,
    ) -> EvaluationOutcome {
        if recipient.configurations.is_empty() {
            return EvaluationOutcome::with_error(AddressingError::NoTransportConfigurations);
        }

        let mut outcome = EvaluationOutcome::default();
        // Set when a configuration was passed over without recording an error.
        let mut declined = false;

        for configuration in ranked(&recipient.configurations) {
            if !configuration.enabled {
                declined = true;
                continue;
            }

            let Some(transport) = self
                .registry
                .transport_with_key(&configuration.transport_key)
            else {
                tracing::warn!(
                    recipient_id = %recipient.id(),
                    configuration_id = %configuration.id,
                    transport_key = %configuration.transport_key,
                    "Transport not registered"
                );
                outcome.errors.push(AddressingError::TransportNotFound {
                    configuration_id: configuration.id,
                    transport_key: configuration.transport_key.clone(),
                });
                continue;
            };

            if !transport.accepts_new_messages() {
                tracing::debug!(
                    transport_key = %configuration.transport_key,
                    "Transport not accepting new messages"
                );
                declined = true;
                continue;
            }

            let matched = match self
                .expressions
                .evaluate(&configuration.selection_expression, context)
            {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::warn!(
                        recipient_id = %recipient.id(),
                        configuration_id = %configuration.id,
                        error = %e,
                        "Selection expression failed"
                    );
                    outcome.errors.push(AddressingError::ExpressionEvaluationFailed {
                        configuration_id: configuration.id,
                        expression: configuration.selection_expression.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !matched || !transport.can_send_to(recipient, message) {
                declined = true;
                continue;
            }

            tracing::debug!(
                recipient_id = %recipient.id(),
                configuration_id = %configuration.id,
                transport_key = %configuration.transport_key,
                rank = configuration.rank,
                "Transport selected"
            );
            outcome.selected.push(SelectedTransport {
                configuration: configuration.clone(),
                transport,
            });

            if !configuration.evaluate_other_configurations {
                break;
            }
        }

        // Skip the generic error only when recorded errors are the whole story.
        if outcome.selected.is_empty() && (outcome.errors.is_empty() || declined) {
            outcome.errors.push(AddressingError::NoMatchingConfigurations);
        }

        outcome
    }
}

/// Configurations by rank, highest first; ties keep insertion order.
fn ranked(configurations: &[TransportConfiguration]) -> Vec<&TransportConfiguration> {
    let mut ordered: Vec<&TransportConfiguration> = configurations.iter().collect();
    ordered.sort_by(|a, b| b.rank.cmp(&a.rank));
    ordered
}

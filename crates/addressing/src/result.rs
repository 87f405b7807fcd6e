//! Addressing outcomes. Errors here are data collected per recipient, not failures.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::configuration::TransportConfiguration;
use crate::recipient::{Recipient, RecipientId, RecipientType};
use crate::transport::Transport;

/// Why a recipient produced fewer selections than it might have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressingError {
    #[error("recipient has no transport configurations")]
    NoTransportConfigurations,

    #[error("no transport configuration matched")]
    NoMatchingConfigurations,

    #[error("transport '{transport_key}' of configuration {configuration_id} is not registered")]
    TransportNotFound {
        configuration_id: Uuid,
        transport_key: String,
    },

    #[error("selection expression of configuration {configuration_id} failed: {reason}")]
    ExpressionEvaluationFailed {
        configuration_id: Uuid,
        expression: String,
        reason: String,
    },

    #[error("group has neither members nor transport configurations")]
    EmptyGroupWithNoConfigurations,
}

/// A configuration that matched, with the transport that will carry it.
#[derive(Clone)]
pub struct SelectedTransport {
    pub configuration: TransportConfiguration,
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for SelectedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedTransport")
            .field("configuration_id", &self.configuration.id)
            .field("transport_key", &self.transport.key())
            .field("rank", &self.configuration.rank)
            .finish()
    }
}

/// Selections and errors from evaluating one recipient's own configurations.
#[derive(Debug, Clone, Default)]
pub struct EvaluationOutcome {
    /// In evaluation order, so the first entry is the highest-ranked selection
    pub selected: Vec<SelectedTransport>,
    pub errors: Vec<AddressingError>,
}

impl EvaluationOutcome {
    pub fn with_error(error: AddressingError) -> Self {
        Self {
            selected: Vec::new(),
            errors: vec![error],
        }
    }

    pub fn has_selection(&self) -> bool {
        !self.selected.is_empty()
    }

    /// True iff the highest-ranked selection explicitly stops hierarchy expansion.
    pub fn should_stop_hierarchy_expansion(&self) -> bool {
        self.selected
            .first()
            .is_some_and(|s| s.configuration.continue_in_hierarchy.stops())
    }
}

/// The resolution entry for one distinct recipient.
#[derive(Debug, Clone)]
pub struct AddressingResult {
    pub recipient_id: RecipientId,
    pub recipient_type: RecipientType,
    pub recipient_name: String,
    pub selected: Vec<SelectedTransport>,
    pub errors: Vec<AddressingError>,
    /// Recipients to resolve next (group members); empty for leaves
    pub expansion: Vec<RecipientId>,
}

impl AddressingResult {
    pub fn new(recipient: &Recipient, outcome: EvaluationOutcome, expansion: Vec<RecipientId>) -> Self {
        Self {
            recipient_id: recipient.id(),
            recipient_type: recipient.recipient_type(),
            recipient_name: recipient.name.clone(),
            selected: outcome.selected,
            errors: outcome.errors,
            expansion,
        }
    }

    pub fn transport_keys(&self) -> Vec<&str> {
        self.selected.iter().map(|s| s.transport.key()).collect()
    }
}

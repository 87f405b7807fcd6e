//! Per-type evaluation policy on top of [`TransportConfigurationEvaluator`].
//!
//! - Person: own configurations only, never expands
//! - Role: delegates exclusively to its assigned person, else behaves like a person
//! - Group: own configurations, then fans out to members unless a selected
//!   configuration stops the hierarchy

use beacon_common::types::Message;

use crate::context::EvaluationContext;
use crate::evaluator::TransportConfigurationEvaluator;
use crate::recipient::{Group, Recipient, RecipientId, Role};
use crate::result::{AddressingError, AddressingResult, EvaluationOutcome};

/// What evaluating a role produced.
#[derive(Debug, Clone)]
pub enum RoleEvaluation {
    /// No person assigned; the role answered for itself.
    Addressed(AddressingResult),
    /// The assigned person must be evaluated in the role's place.
    Delegated(RecipientId),
}

pub fn evaluate_person(
    evaluator: &TransportConfigurationEvaluator,
    recipient: &Recipient,
    context: &EvaluationContext,
    message: &Message,
) -> AddressingResult {
    let outcome = evaluator.evaluate(recipient, context, message);
    AddressingResult::new(recipient, outcome, Vec::new())
}

pub fn evaluate_role(
    evaluator: &TransportConfigurationEvaluator,
    recipient: &Recipient,
    role: &Role,
    context: &EvaluationContext,
    message: &Message,
) -> RoleEvaluation {
    match role.assigned_person {
        Some(person) => {
            tracing::debug!(role_id = %recipient.id(), person_id = %person, "Role delegated");
            RoleEvaluation::Delegated(person)
        }
        None => {
            let outcome = evaluator.evaluate(recipient, context, message);
            RoleEvaluation::Addressed(AddressingResult::new(recipient, outcome, Vec::new()))
        }
    }
}

pub fn evaluate_group(
    evaluator: &TransportConfigurationEvaluator,
    recipient: &Recipient,
    group: &Group,
    context: &EvaluationContext,
    message: &Message,
) -> AddressingResult {
    if recipient.configurations.is_empty() {
        if !group.can_resolve() {
            return AddressingResult::new(
                recipient,
                EvaluationOutcome::with_error(AddressingError::EmptyGroupWithNoConfigurations),
                Vec::new(),
            );
        }
        return AddressingResult::new(recipient, EvaluationOutcome::default(), group.members.clone());
    }

    let outcome = evaluator.evaluate(recipient, context, message);
    let expand = group.can_resolve()
        && (!outcome.has_selection() || !outcome.should_stop_hierarchy_expansion());

    if !expand && group.can_resolve() {
        tracing::debug!(group_id = %recipient.id(), "Hierarchy expansion stopped by group configuration");
    }

    let expansion = if expand {
        group.members.clone()
    } else {
        Vec::new()
    };
    AddressingResult::new(recipient, outcome, expansion)
}

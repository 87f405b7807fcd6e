//! Recipient resolver: breadth-first expansion of root recipients into addressing results.
//!
//! Every distinct recipient is evaluated at most once. The visited set is what
//! makes membership cycles terminate and keeps diamond-shaped memberships from
//! delivering twice.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use beacon_common::types::Message;

use crate::context::{EvaluationContext, SelectionExpressionEvaluator};
use crate::evaluator::TransportConfigurationEvaluator;
use crate::expansion::{RoleEvaluation, evaluate_group, evaluate_person, evaluate_role};
use crate::recipient::{RecipientId, RecipientKind, RecipientRepository};
use crate::result::AddressingResult;
use crate::transport::TransportRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("root recipient {0} not found")]
    RecipientNotFound(RecipientId),
}

pub struct RecipientResolver {
    evaluator: TransportConfigurationEvaluator,
}

impl RecipientResolver {
    pub fn new(
        registry: Arc<TransportRegistry>,
        expressions: Arc<dyn SelectionExpressionEvaluator>,
    ) -> Self {
        Self {
            evaluator: TransportConfigurationEvaluator::new(registry, expressions),
        }
    }

    /// Resolve `roots` for `message`, evaluating selection expressions as of now.
    pub fn resolve<R>(
        &self,
        repository: &R,
        roots: &[RecipientId],
        message: &Message,
    ) -> Result<Vec<AddressingResult>, ResolveError>
    where
        R: RecipientRepository + ?Sized,
    {
        let context = EvaluationContext::for_message(message, Utc::now());
        self.resolve_with_context(repository, roots, message, &context)
    }

    /// Resolve `roots` with a caller-built context.
    ///
    /// Returns one result per distinct recipient in breadth-first discovery order.
    /// A delegating role yields no entry of its own; its person is evaluated
    /// immediately in its place.
    pub fn resolve_with_context<R>(
        &self,
        repository: &R,
        roots: &[RecipientId],
        message: &Message,
        context: &EvaluationContext,
    ) -> Result<Vec<AddressingResult>, ResolveError>
    where
        R: RecipientRepository + ?Sized,
    {
        if let Some(missing) = roots.iter().find(|id| repository.recipient(**id).is_none()) {
            return Err(ResolveError::RecipientNotFound(*missing));
        }

        let mut queue: VecDeque<RecipientId> = roots.iter().copied().collect();
        let mut visited: HashSet<RecipientId> = HashSet::new();
        let mut results = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }

            let Some(recipient) = repository.recipient(id) else {
                tracing::warn!(recipient_id = %id, "Referenced recipient not found, skipping");
                continue;
            };

            let result = match &recipient.kind {
                RecipientKind::Person(_) => evaluate_person(&self.evaluator, recipient, context, message),
                RecipientKind::Group(group) => {
                    evaluate_group(&self.evaluator, recipient, group, context, message)
                }
                RecipientKind::Role(role) => {
                    match evaluate_role(&self.evaluator, recipient, role, context, message) {
                        RoleEvaluation::Addressed(result) => result,
                        RoleEvaluation::Delegated(person) => {
                            queue.push_front(person);
                            continue;
                        }
                    }
                }
            };

            queue.extend(
                result
                    .expansion
                    .iter()
                    .copied()
                    .filter(|next| !visited.contains(next)),
            );
            results.push(result);
        }

        tracing::debug!(
            roots = roots.len(),
            visited = visited.len(),
            results = results.len(),
            "Recipients resolved"
        );

        Ok(results)
    }
}

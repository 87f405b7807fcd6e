//! Evaluation context and the selection-expression port.
//!
//! The expression language is not defined here. Expressions are opaque strings
//! handed to an injected [`SelectionExpressionEvaluator`].

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use beacon_common::types::{Message, Priority};

/// Facts a selection expression may read. Built once per resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationContext {
    message_id: Uuid,
    priority: Priority,
    evaluated_at: DateTime<Utc>,
    facts: BTreeMap<String, serde_json::Value>,
}

impl EvaluationContext {
    /// Context for `message` evaluated at `evaluated_at`.
    ///
    /// Seeds the facts `priority`, `hour` (0-23, UTC) and `weekday` (`mon`..`sun`).
    pub fn for_message(message: &Message, evaluated_at: DateTime<Utc>) -> Self {
        let mut facts = BTreeMap::new();
        facts.insert(
            "priority".to_string(),
            serde_json::json!(message.priority.to_string()),
        );
        facts.insert("hour".to_string(), serde_json::json!(evaluated_at.hour()));
        facts.insert(
            "weekday".to_string(),
            serde_json::json!(evaluated_at.weekday().to_string().to_lowercase()),
        );

        Self {
            message_id: message.id,
            priority: message.priority,
            evaluated_at,
            facts,
        }
    }

    /// Add or replace a caller-supplied fact.
    pub fn with_fact(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.facts.insert(key.into(), value);
        self
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }

    pub fn fact(&self, key: &str) -> Option<&serde_json::Value> {
        self.facts.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("unsupported selection expression '{0}'")]
    Unsupported(String),

    #[error("malformed selection expression '{expression}': {reason}")]
    Malformed { expression: String, reason: String },
}

/// Evaluates a selection expression against a context.
pub trait SelectionExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &EvaluationContext) -> Result<bool, ExpressionError>;
}

impl<F> SelectionExpressionEvaluator for F
where
    F: Fn(&str, &EvaluationContext) -> Result<bool, ExpressionError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, context: &EvaluationContext) -> Result<bool, ExpressionError> {
        self(expression, context)
    }
}

/// Accepts only the literals `true` and `false` (trimmed, any case).
///
/// Deployments that need real predicates plug in their own evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantExpressionEvaluator;

impl SelectionExpressionEvaluator for ConstantExpressionEvaluator {
    fn evaluate(&self, expression: &str, _context: &EvaluationContext) -> Result<bool, ExpressionError> {
        let trimmed = expression.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if trimmed.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(ExpressionError::Unsupported(expression.to_string()))
        }
    }
}

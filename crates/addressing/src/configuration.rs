//! Transport configurations: ranked, conditional bindings from a recipient to a transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Expression used when none is given; always selects.
pub const DEFAULT_SELECTION_EXPRESSION: &str = "true";

/// Whether a matching group configuration lets resolution continue into members.
///
/// `Unset` behaves like `Continue`. Only an explicit `Stop` suppresses expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyContinuation {
    Continue,
    Stop,
    #[default]
    Unset,
}

impl HierarchyContinuation {
    pub fn stops(self) -> bool {
        matches!(self, HierarchyContinuation::Stop)
    }

    /// Map a nullable storage column onto the three states.
    pub fn from_column(value: Option<bool>) -> Self {
        match value {
            Some(true) => HierarchyContinuation::Continue,
            Some(false) => HierarchyContinuation::Stop,
            None => HierarchyContinuation::Unset,
        }
    }

    pub fn to_column(self) -> Option<bool> {
        match self {
            HierarchyContinuation::Continue => Some(true),
            HierarchyContinuation::Stop => Some(false),
            HierarchyContinuation::Unset => None,
        }
    }
}

/// A ranked binding from a recipient to one transport.
///
/// The same `transport_key` may appear in several configurations of one recipient;
/// `id` is what tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfiguration {
    pub id: Uuid,
    pub transport_key: String,
    /// Higher ranks are evaluated first
    pub rank: i32,
    pub selection_expression: String,
    pub continue_in_hierarchy: HierarchyContinuation,
    /// When false, a match on this configuration ends evaluation of lower ranks
    pub evaluate_other_configurations: bool,
    pub enabled: bool,
    /// Transport-specific settings (e.g. the pager cap code)
    pub payload: serde_json::Value,
}

impl TransportConfiguration {
    pub fn new(transport_key: impl Into<String>, rank: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            transport_key: transport_key.into(),
            rank,
            selection_expression: DEFAULT_SELECTION_EXPRESSION.to_string(),
            continue_in_hierarchy: HierarchyContinuation::Unset,
            evaluate_other_configurations: true,
            enabled: true,
            payload: serde_json::json!({}),
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.selection_expression = expression.into();
        self
    }

    pub fn with_continue_in_hierarchy(mut self, continuation: HierarchyContinuation) -> Self {
        self.continue_in_hierarchy = continuation;
        self
    }

    /// Stop evaluating lower-ranked configurations once this one matches.
    pub fn exclusive(mut self) -> Self {
        self.evaluate_other_configurations = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

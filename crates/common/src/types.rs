use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message priority levels, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// An outbound notification. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub body: String,
    pub priority: Priority,
}

impl Message {
    pub fn new(body: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: Uuid::now_v7(),
            body: body.into(),
            priority,
        }
    }
}

/// A message waiting in the delivery queue of a paging transport.
///
/// Only the delivery queue mutates `attempted_to_send` and `sent`.
/// Rows are never deleted here; retention is handled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PagerMessage {
    pub id: Uuid,
    /// Key of the paging transport that owns this message
    pub transport_key: String,
    /// Channel address (cap code) on the paging network
    pub cap_code: String,
    pub body: String,
    pub priority: Priority,
    pub queued_at: DateTime<Utc>,
    pub attempted_to_send: i32,
    pub sent: bool,
}

impl PagerMessage {
    /// A fresh, unsent message queued at `queued_at`.
    pub fn queued(
        transport_key: impl Into<String>,
        cap_code: impl Into<String>,
        body: impl Into<String>,
        priority: Priority,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            transport_key: transport_key.into(),
            cap_code: cap_code.into(),
            body: body.into(),
            priority,
            queued_at,
            attempted_to_send: 0,
            sent: false,
        }
    }
}

/// Notification published by the delivery queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// The appliance acknowledged the message.
    Transmitted {
        message_id: Uuid,
        transport_key: String,
        cap_code: String,
        at: DateTime<Utc>,
    },
    /// Retries are exhausted. Published once per message.
    TransmissionFailed {
        message_id: Uuid,
        transport_key: String,
        cap_code: String,
        attempts: i32,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl DeliveryEvent {
    pub fn message_id(&self) -> Uuid {
        match self {
            DeliveryEvent::Transmitted { message_id, .. }
            | DeliveryEvent::TransmissionFailed { message_id, .. } => *message_id,
        }
    }
}

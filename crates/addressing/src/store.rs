//! Postgres snapshot loader for the recipient graph.
//!
//! Resolution itself never touches the database: the graph is read into a
//! [`RecipientGraph`] arena first, and the resolver works on that snapshot.

use sqlx::PgPool;
use uuid::Uuid;

use beacon_common::error::AppError;

use crate::configuration::{HierarchyContinuation, TransportConfiguration};
use crate::recipient::{Recipient, RecipientGraph, RecipientId, RecipientType};

#[derive(Debug, sqlx::FromRow)]
struct RecipientRow {
    id: Uuid,
    kind: String,
    name: String,
    assigned_person_id: Option<Uuid>,
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    group_id: Uuid,
    member_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct ConfigurationRow {
    id: Uuid,
    recipient_id: Uuid,
    transport_key: String,
    rank: i32,
    selection_expression: String,
    continue_in_hierarchy: Option<bool>,
    evaluate_other_configurations: bool,
    enabled: bool,
    payload: serde_json::Value,
}

impl From<ConfigurationRow> for TransportConfiguration {
    fn from(row: ConfigurationRow) -> Self {
        Self {
            id: row.id,
            transport_key: row.transport_key,
            rank: row.rank,
            selection_expression: row.selection_expression,
            continue_in_hierarchy: HierarchyContinuation::from_column(row.continue_in_hierarchy),
            evaluate_other_configurations: row.evaluate_other_configurations,
            enabled: row.enabled,
            payload: row.payload,
        }
    }
}

pub struct PgRecipientGraphLoader;

impl PgRecipientGraphLoader {
    /// Load every recipient, membership, assignment and configuration.
    ///
    /// Inconsistent rows (e.g. a role assigned to a group) are logged and skipped.
    pub async fn load(pool: &PgPool) -> Result<RecipientGraph, AppError> {
        let recipients: Vec<RecipientRow> =
            sqlx::query_as("SELECT id, kind, name, assigned_person_id FROM recipients")
                .fetch_all(pool)
                .await?;

        let members: Vec<MemberRow> = sqlx::query_as(
            "SELECT group_id, member_id FROM group_members ORDER BY group_id, position",
        )
        .fetch_all(pool)
        .await?;

        let configurations: Vec<ConfigurationRow> = sqlx::query_as(
            r#"
            SELECT id, recipient_id, transport_key, rank, selection_expression,
                   continue_in_hierarchy, evaluate_other_configurations, enabled, payload
            FROM transport_configurations
            ORDER BY recipient_id, position
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut graph = RecipientGraph::new();
        let mut assignments = Vec::new();

        for row in recipients {
            let recipient_type: RecipientType = match row.kind.parse() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(recipient_id = %row.id, error = %e, "Skipping recipient");
                    continue;
                }
            };
            if let Some(person) = row.assigned_person_id {
                assignments.push((RecipientId::from(row.id), RecipientId::from(person)));
            }
            graph
                .insert(Recipient::new(row.id.into(), row.name, recipient_type))
                .map_err(|e| AppError::Internal(e.to_string()))?;
        }

        for row in members {
            if let Err(e) = graph.add_member(row.group_id.into(), row.member_id.into()) {
                tracing::warn!(group_id = %row.group_id, member_id = %row.member_id, error = %e, "Skipping membership");
            }
        }

        for (role, person) in assignments {
            if let Err(e) = graph.assign_person(role, person) {
                tracing::warn!(role_id = %role, person_id = %person, error = %e, "Skipping role assignment");
            }
        }

        for row in configurations {
            let recipient_id = RecipientId::from(row.recipient_id);
            if let Err(e) = graph.add_configuration(recipient_id, row.into()) {
                tracing::warn!(error = %e, "Skipping transport configuration");
            }
        }

        tracing::info!(recipients = graph.len(), "Recipient graph loaded");
        Ok(graph)
    }
}

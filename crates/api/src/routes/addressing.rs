//! Addressing routes: resolution preview and notification submission.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beacon_addressing::store::PgRecipientGraphLoader;
use beacon_addressing::{
    AddressingError, AddressingResult, DispatchReport, NotificationDispatcher, RecipientGraph,
    RecipientId, RecipientType, ResolveError,
};
use beacon_common::error::AppError;
use beacon_common::types::{Message, Priority};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/addressing/resolve", post(resolve_recipients))
        .route("/api/notifications", post(send_notification))
}

#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub recipients: Vec<RecipientId>,
    pub body: String,
    #[serde(default)]
    pub priority: Priority,
}

impl NotificationRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.recipients.is_empty() {
            return Err(AppError::Validation("at least one recipient is required".to_string()));
        }
        if self.body.trim().is_empty() {
            return Err(AppError::Validation("body must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct SelectionView {
    pub configuration_id: Uuid,
    pub transport_key: String,
    pub rank: i32,
}

#[derive(Debug, Serialize)]
pub struct AddressingResultView {
    pub recipient_id: RecipientId,
    pub recipient_type: RecipientType,
    pub recipient_name: String,
    pub selected: Vec<SelectionView>,
    pub errors: Vec<AddressingError>,
    pub expansion: Vec<RecipientId>,
}

impl From<&AddressingResult> for AddressingResultView {
    fn from(result: &AddressingResult) -> Self {
        Self {
            recipient_id: result.recipient_id,
            recipient_type: result.recipient_type,
            recipient_name: result.recipient_name.clone(),
            selected: result
                .selected
                .iter()
                .map(|s| SelectionView {
                    configuration_id: s.configuration.id,
                    transport_key: s.configuration.transport_key.clone(),
                    rank: s.configuration.rank,
                })
                .collect(),
            errors: result.errors.clone(),
            expansion: result.expansion.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub message_id: Uuid,
    pub results: Vec<AddressingResultView>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub message_id: Uuid,
    pub results: Vec<AddressingResultView>,
    pub report: DispatchReport,
}

fn resolve(
    state: &AppState,
    graph: &RecipientGraph,
    request: &NotificationRequest,
    message: &Message,
) -> Result<Vec<AddressingResult>, AppError> {
    state
        .resolver
        .resolve(graph, &request.recipients, message)
        .map_err(|e| match e {
            ResolveError::RecipientNotFound(_) => AppError::NotFound(e.to_string()),
        })
}

/// POST /api/addressing/resolve: show what a notification would select, without queueing it.
async fn resolve_recipients(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    request.validate()?;

    let graph = PgRecipientGraphLoader::load(&state.pool).await?;
    let message = Message::new(request.body.clone(), request.priority);
    let results = resolve(&state, &graph, &request, &message)?;

    Ok(Json(ResolveResponse {
        message_id: message.id,
        results: results.iter().map(AddressingResultView::from).collect(),
    }))
}

/// POST /api/notifications: resolve recipients and queue the message on every selected transport.
async fn send_notification(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> Result<Json<NotificationResponse>, AppError> {
    request.validate()?;

    let graph = PgRecipientGraphLoader::load(&state.pool).await?;
    let message = Message::new(request.body.clone(), request.priority);
    let results = resolve(&state, &graph, &request, &message)?;

    let report = NotificationDispatcher::new()
        .dispatch(&graph, &results, &message)
        .await;

    tracing::info!(
        message_id = %message.id,
        recipients = results.len(),
        queued = report.queued.len(),
        failures = report.failures.len(),
        "Notification dispatched"
    );

    Ok(Json(NotificationResponse {
        message_id: message.id,
        results: results.iter().map(AddressingResultView::from).collect(),
        report,
    }))
}

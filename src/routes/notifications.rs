use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::NotificationRecord;
use crate::db::RecordRepository;
use crate::error::AppResult;
use crate::services::dispatcher::{BulkOutcome, Notification, SendOptions};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/send", post(send_to_recipient))
        .route("/bulk", post(send_bulk))
        .route("/role", post(send_to_role))
        .route("/emergency", post(send_emergency))
        .route("/history/:recipient_id", get(history))
        .route("/:id/read", put(mark_read))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub recipient_id: i64,
    pub notification: Notification,
    #[serde(default)]
    pub options: SendOptions,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub delivered: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub recipient_ids: Vec<i64>,
    pub notification: Notification,
    #[serde(default)]
    pub options: SendOptions,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
    pub notification: Notification,
    #[serde(default)]
    pub options: SendOptions,
}

#[derive(Debug, Deserialize)]
pub struct EmergencyRequest {
    pub recipient_ids: Vec<i64>,
    pub notification: Notification,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn send_to_recipient(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendRequest>,
) -> AppResult<Json<SendResponse>> {
    let delivered = state
        .dispatcher
        .send_to_recipient(request.recipient_id, &request.notification, &request.options)
        .await?;

    Ok(Json(SendResponse { delivered }))
}

async fn send_bulk(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkRequest>,
) -> AppResult<Json<BulkOutcome>> {
    let outcome = state
        .dispatcher
        .send_bulk(&request.recipient_ids, &request.notification, &request.options)
        .await?;

    Ok(Json(outcome))
}

async fn send_to_role(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RoleRequest>,
) -> AppResult<Json<BulkOutcome>> {
    let outcome = state
        .dispatcher
        .send_to_role(&request.role, &request.notification, &request.options)
        .await?;

    Ok(Json(outcome))
}

async fn send_emergency(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmergencyRequest>,
) -> AppResult<Json<BulkOutcome>> {
    let outcome = state
        .dispatcher
        .send_emergency(&request.recipient_ids, &request.notification)
        .await?;

    Ok(Json(outcome))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<NotificationRecord>>> {
    let records =
        RecordRepository::find_by_recipient(&state.db, recipient_id, query.limit, query.offset)
            .await?;

    Ok(Json(records))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<NotificationRecord>> {
    let record = RecordRepository::mark_read(&state.db, &id).await?;
    Ok(Json(record))
}

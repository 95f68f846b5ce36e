use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{DeadLetterMessage, Priority};
use crate::db::QueueRepository;
use crate::error::AppResult;
use crate::services::queue::{EnqueueOptions, QueueStats};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(enqueue))
        .route("/stats", get(stats))
        .route("/dead-letter", get(dead_letters))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub message_type: String,
    pub payload: serde_json::Value,
    /// Routes into the recipient's private queue when present.
    pub recipient_id: Option<i64>,
    pub priority: Option<Priority>,
    pub max_attempts: Option<i32>,
    pub delay_seconds: Option<i64>,
    pub expires_in_seconds: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Producer-facing enqueue. Fire-and-forget: the id is the only thing a
/// producer ever learns about the message.
async fn enqueue(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnqueueRequest>,
) -> AppResult<Json<EnqueueResponse>> {
    let options = EnqueueOptions {
        priority: request.priority,
        max_attempts: request.max_attempts,
        delay_seconds: request.delay_seconds,
        expires_in_seconds: request.expires_in_seconds,
        metadata: request.metadata,
    };

    let id = match request.recipient_id {
        Some(recipient_id) => {
            state
                .queue
                .enqueue_for_recipient(recipient_id, &request.message_type, request.payload, options)
                .await?
        }
        None => {
            state
                .queue
                .enqueue(&request.message_type, request.payload, options)
                .await?
        }
    };

    Ok(Json(EnqueueResponse { id }))
}

/// Queue depths for external health checks.
async fn stats(State(state): State<Arc<AppState>>) -> AppResult<Json<QueueStats>> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}

/// Most recent dead-letter entries, for operator inspection.
async fn dead_letters(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<DeadLetterMessage>>> {
    let entries = QueueRepository::list_dead_letters(&state.db, 100).await?;
    Ok(Json(entries))
}

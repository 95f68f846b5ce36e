use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::db::models::{Channel, DeviceEndpoint, RegisterDevice};
use crate::error::{AppError, AppResult};
use crate::services::devices::DeviceService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register_device))
        .route("/unregister", post(unregister_device))
        .route("/:recipient_id", get(list_devices))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub recipient_id: i64,
    pub token: String,
    pub channel: Channel,
    pub role: Option<String>,
    pub device_info: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UnregisterDeviceRequest {
    pub recipient_id: i64,
    pub token: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn register_device(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterDeviceRequest>,
) -> AppResult<Json<DeviceEndpoint>> {
    let service = DeviceService::new(&state);
    let endpoint = service
        .register(RegisterDevice {
            recipient_id: request.recipient_id,
            token: request.token,
            channel: request.channel,
            recipient_role: request.role,
            device_info: request.device_info,
        })
        .await?;

    Ok(Json(endpoint))
}

async fn unregister_device(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UnregisterDeviceRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let service = DeviceService::new(&state);
    let found = service
        .unregister(request.recipient_id, &request.token)
        .await?;

    if !found {
        return Err(AppError::NotFound("Device endpoint not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// All endpoints for a recipient, active and inactive (audit view).
async fn list_devices(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<i64>,
) -> AppResult<Json<Vec<DeviceEndpoint>>> {
    let service = DeviceService::new(&state);
    let endpoints = service.get_all_endpoints(recipient_id).await?;
    Ok(Json(endpoints))
}

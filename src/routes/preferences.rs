use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db::models::{NotificationPreferences, UpdateNotificationPreferences};
use crate::error::AppResult;
use crate::services::devices::PreferenceService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/:recipient_id", get(get_preferences).put(update_preferences))
}

/// Current flags; a recipient without a row gets the all-true defaults.
async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<i64>,
) -> AppResult<Json<NotificationPreferences>> {
    let service = PreferenceService::new(&state);
    let preferences = service.get(recipient_id).await?;
    Ok(Json(preferences))
}

/// Merge-update; omitted fields keep their prior values.
async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<i64>,
    Json(request): Json<UpdateNotificationPreferences>,
) -> AppResult<Json<NotificationPreferences>> {
    let service = PreferenceService::new(&state);
    let preferences = service.update(recipient_id, request).await?;
    Ok(Json(preferences))
}

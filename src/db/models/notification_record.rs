use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Durable history entry written after every dispatch attempt. Read-only
/// after creation except for the `is_read` flag.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub recipient_id: i64,
    pub title: String,
    pub body: String,
    pub category: String,
    pub success: bool,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRecord {
    pub recipient_id: i64,
    pub title: String,
    pub body: String,
    pub category: String,
    pub success: bool,
}

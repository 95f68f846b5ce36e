use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateNotificationRecord, NotificationRecord};
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Record Repository
// ============================================================================

pub struct RecordRepository;

impl RecordRepository {
    pub async fn create(
        pool: &SqlitePool,
        record: CreateNotificationRecord,
        now: NaiveDateTime,
    ) -> AppResult<NotificationRecord> {
        let id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, NotificationRecord>(
            r#"
            INSERT INTO notification_records (
                id, recipient_id, title, body, category, success, is_read, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, FALSE, ?)
            RETURNING
                id, recipient_id, title, body, category, success, is_read, created_at
            "#,
        )
        .bind(id)
        .bind(record.recipient_id)
        .bind(record.title)
        .bind(record.body)
        .bind(record.category)
        .bind(record.success)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_recipient(
        pool: &SqlitePool,
        recipient_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<NotificationRecord>> {
        let limit_val = limit.unwrap_or(100);
        let offset_val = offset.unwrap_or(0);

        sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT
                id, recipient_id, title, body, category, success, is_read, created_at
            FROM notification_records
            WHERE recipient_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            OFFSET ?
            "#,
        )
        .bind(recipient_id)
        .bind(limit_val)
        .bind(offset_val)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Flip the only mutable field on a record.
    pub async fn mark_read(pool: &SqlitePool, id: &str) -> AppResult<NotificationRecord> {
        sqlx::query_as::<_, NotificationRecord>(
            r#"
            UPDATE notification_records
            SET is_read = TRUE
            WHERE id = ?
            RETURNING
                id, recipient_id, title, body, category, success, is_read, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound("Notification record not found".to_string()))
    }

    pub async fn count_unread(pool: &SqlitePool, recipient_id: i64) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notification_records WHERE recipient_id = ? AND is_read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{NotificationPreferences, UpdateNotificationPreferences};
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Preferences Repository
// ============================================================================

pub struct PreferencesRepository;

impl PreferencesRepository {
    /// Create the all-true default row for a recipient.
    pub async fn create(
        pool: &SqlitePool,
        recipient_id: i64,
        now: NaiveDateTime,
    ) -> AppResult<NotificationPreferences> {
        let id = Uuid::new_v4().to_string();

        let row = sqlx::query_as::<_, NotificationPreferences>(
            r#"
            INSERT INTO notification_preferences (
                id, recipient_id, order_updates, payment_notifications,
                promotions, system_alerts, chat_messages, created_at, updated_at
            ) VALUES (?, ?, TRUE, TRUE, TRUE, TRUE, TRUE, ?, ?)
            RETURNING
                id, recipient_id, order_updates, payment_notifications,
                promotions, system_alerts, chat_messages, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_recipient(
        pool: &SqlitePool,
        recipient_id: i64,
    ) -> AppResult<Option<NotificationPreferences>> {
        sqlx::query_as::<_, NotificationPreferences>(
            r#"
            SELECT
                id, recipient_id, order_updates, payment_notifications,
                promotions, system_alerts, chat_messages, created_at, updated_at
            FROM notification_preferences
            WHERE recipient_id = ?
            "#,
        )
        .bind(recipient_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Absence of a row implies all-true defaults; first access creates it.
    pub async fn get_or_create(
        pool: &SqlitePool,
        recipient_id: i64,
        now: NaiveDateTime,
    ) -> AppResult<NotificationPreferences> {
        if let Some(preferences) = Self::find_by_recipient(pool, recipient_id).await? {
            Ok(preferences)
        } else {
            Self::create(pool, recipient_id, now).await
        }
    }

    /// Merge-update: fields missing from the request retain prior values.
    pub async fn update(
        pool: &SqlitePool,
        recipient_id: i64,
        update: UpdateNotificationPreferences,
        now: NaiveDateTime,
    ) -> AppResult<NotificationPreferences> {
        let current = Self::get_or_create(pool, recipient_id, now).await?;

        let order_updates = update.order_updates.unwrap_or(current.order_updates);
        let payment_notifications = update
            .payment_notifications
            .unwrap_or(current.payment_notifications);
        let promotions = update.promotions.unwrap_or(current.promotions);
        let system_alerts = update.system_alerts.unwrap_or(current.system_alerts);
        let chat_messages = update.chat_messages.unwrap_or(current.chat_messages);

        sqlx::query_as::<_, NotificationPreferences>(
            r#"
            UPDATE notification_preferences
            SET order_updates = ?,
                payment_notifications = ?,
                promotions = ?,
                system_alerts = ?,
                chat_messages = ?,
                updated_at = ?
            WHERE recipient_id = ?
            RETURNING
                id, recipient_id, order_updates, payment_notifications,
                promotions, system_alerts, chat_messages, created_at, updated_at
            "#,
        )
        .bind(order_updates)
        .bind(payment_notifications)
        .bind(promotions)
        .bind(system_alerts)
        .bind(chat_messages)
        .bind(now)
        .bind(recipient_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{DeviceEndpoint, RegisterDevice};
use crate::error::{AppError, AppResult};

// ============================================================================
// Device Registry Repository
// ============================================================================

pub struct DeviceRepository;

impl DeviceRepository {
    /// Upsert by (`recipient_id`, `token`): registering an already-known
    /// token reactivates and refreshes the existing row instead of creating
    /// a duplicate.
    pub async fn register(
        pool: &SqlitePool,
        registration: RegisterDevice,
        now: NaiveDateTime,
    ) -> AppResult<DeviceEndpoint> {
        let id = Uuid::new_v4().to_string();
        let role = registration
            .recipient_role
            .unwrap_or_else(|| "consumer".to_string());
        let device_info = registration.device_info.map(|info| info.to_string());

        let row = sqlx::query_as::<_, DeviceEndpoint>(
            r#"
            INSERT INTO device_endpoints (
                id, recipient_id, channel, token, recipient_role, device_info,
                is_active, last_used_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, TRUE, ?, ?, ?)
            ON CONFLICT (recipient_id, token) DO UPDATE SET
                channel = excluded.channel,
                recipient_role = excluded.recipient_role,
                device_info = excluded.device_info,
                is_active = TRUE,
                last_used_at = excluded.last_used_at,
                updated_at = excluded.updated_at
            RETURNING
                id, recipient_id, channel, token, recipient_role, device_info,
                is_active, last_used_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(registration.recipient_id)
        .bind(registration.channel.as_str())
        .bind(registration.token)
        .bind(role)
        .bind(device_info)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Deactivate an endpoint. The row is kept as an audit trail.
    /// Returns false when no matching endpoint exists.
    pub async fn unregister(
        pool: &SqlitePool,
        recipient_id: i64,
        token: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE device_endpoints
            SET is_active = FALSE, updated_at = ?
            WHERE recipient_id = ? AND token = ?
            "#,
        )
        .bind(now)
        .bind(recipient_id)
        .bind(token)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_active_by_recipient(
        pool: &SqlitePool,
        recipient_id: i64,
    ) -> AppResult<Vec<DeviceEndpoint>> {
        sqlx::query_as::<_, DeviceEndpoint>(
            r#"
            SELECT
                id, recipient_id, channel, token, recipient_role, device_info,
                is_active, last_used_at, created_at, updated_at
            FROM device_endpoints
            WHERE recipient_id = ? AND is_active = TRUE
            ORDER BY created_at
            "#,
        )
        .bind(recipient_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_recipient(
        pool: &SqlitePool,
        recipient_id: i64,
    ) -> AppResult<Vec<DeviceEndpoint>> {
        sqlx::query_as::<_, DeviceEndpoint>(
            r#"
            SELECT
                id, recipient_id, channel, token, recipient_role, device_info,
                is_active, last_used_at, created_at, updated_at
            FROM device_endpoints
            WHERE recipient_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(recipient_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Deactivate a single endpoint by id (used when a channel reports the
    /// token as permanently invalid).
    pub async fn deactivate(pool: &SqlitePool, id: &str, now: NaiveDateTime) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE device_endpoints
            SET is_active = FALSE, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Deactivate endpoints not used since `cutoff`.
    pub async fn deactivate_stale(
        pool: &SqlitePool,
        cutoff: NaiveDateTime,
        now: NaiveDateTime,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE device_endpoints
            SET is_active = FALSE, updated_at = ?
            WHERE is_active = TRUE AND last_used_at < ?
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Distinct recipients with at least one active endpoint registered
    /// under the given role. Backs role-targeted fan-out.
    pub async fn recipient_ids_by_role(pool: &SqlitePool, role: &str) -> AppResult<Vec<i64>> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT recipient_id FROM device_endpoints
            WHERE recipient_role = ? AND is_active = TRUE
            ORDER BY recipient_id
            "#,
        )
        .bind(role)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}

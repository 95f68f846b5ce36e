use std::sync::Arc;

use chrono::Duration;
use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::db::models::{
    DeviceEndpoint, NotificationPreferences, RegisterDevice, UpdateNotificationPreferences,
};
use crate::db::{DeviceRepository, PreferencesRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

/// Device registry: which delivery endpoints belong to which recipient.
pub struct DeviceService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl DeviceService {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            pool: state.db.clone(),
            clock: state.clock.clone(),
        }
    }

    pub fn with_pool(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Upsert registration; a re-registered token reactivates its existing
    /// row and refreshes `last_used_at`.
    pub async fn register(&self, registration: RegisterDevice) -> AppResult<DeviceEndpoint> {
        if registration.token.trim().is_empty() {
            return Err(AppError::Validation(
                "Device token cannot be empty".to_string(),
            ));
        }

        let endpoint = DeviceRepository::register(&self.pool, registration, self.clock.now())
            .await?;

        tracing::info!(
            endpoint_id = %endpoint.id,
            recipient_id = endpoint.recipient_id,
            channel = %endpoint.channel,
            "Registered device endpoint"
        );

        Ok(endpoint)
    }

    /// Deactivate an endpoint; the row stays for the audit trail. Returns
    /// false when the (recipient, token) pair is unknown.
    pub async fn unregister(&self, recipient_id: i64, token: &str) -> AppResult<bool> {
        let found =
            DeviceRepository::unregister(&self.pool, recipient_id, token, self.clock.now()).await?;

        if found {
            tracing::info!(recipient_id, "Unregistered device endpoint");
        }

        Ok(found)
    }

    pub async fn get_active_endpoints(&self, recipient_id: i64) -> AppResult<Vec<DeviceEndpoint>> {
        DeviceRepository::find_active_by_recipient(&self.pool, recipient_id).await
    }

    pub async fn get_all_endpoints(&self, recipient_id: i64) -> AppResult<Vec<DeviceEndpoint>> {
        DeviceRepository::find_by_recipient(&self.pool, recipient_id).await
    }

    /// Staleness sweep: deactivate endpoints unused for `older_than_days`.
    pub async fn deactivate_stale(&self, older_than_days: i64) -> AppResult<u64> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(older_than_days.max(0));
        let deactivated = DeviceRepository::deactivate_stale(&self.pool, cutoff, now).await?;

        if deactivated > 0 {
            tracing::info!(deactivated, older_than_days, "Deactivated stale endpoints");
        }

        Ok(deactivated)
    }
}

/// Per-recipient category opt-in flags, created lazily with all-true
/// defaults.
pub struct PreferenceService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl PreferenceService {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            pool: state.db.clone(),
            clock: state.clock.clone(),
        }
    }

    pub fn with_pool(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn get(&self, recipient_id: i64) -> AppResult<NotificationPreferences> {
        PreferencesRepository::get_or_create(&self.pool, recipient_id, self.clock.now()).await
    }

    /// Merge-update; missing fields keep their prior values.
    pub async fn update(
        &self,
        recipient_id: i64,
        update: UpdateNotificationPreferences,
    ) -> AppResult<NotificationPreferences> {
        PreferencesRepository::update(&self.pool, recipient_id, update, self.clock.now()).await
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::db::models::{
    Channel, CreateNotificationRecord, DeviceEndpoint, NotificationCategory, Priority, QueueMessage,
};
use crate::db::{DeviceRepository, PreferencesRepository, RecordRepository};
use crate::error::{AppError, AppResult};
use crate::services::channels::{ChannelRegistry, RealtimeEvent};
use crate::services::scheduler::MessageHandler;

/// User-facing notification content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Per-send options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    pub priority: Option<Priority>,
    pub category: Option<NotificationCategory>,
    pub ttl_seconds: Option<i64>,
    /// Emergency sends skip category gating except for an explicit
    /// system-alerts opt-out.
    pub emergency: bool,
    /// Restrict fan-out to these channels (e.g. email-only messages).
    pub channels: Option<Vec<Channel>>,
}

/// Why a dispatch did or did not deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one endpoint accepted the notification.
    Delivered,
    /// The recipient has no active endpoints (on the selected channels).
    NoEndpoints,
    /// The recipient opted out of this category.
    Gated,
    /// Every endpoint send failed.
    AllFailed,
}

impl DispatchOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

/// Aggregate result of a bulk send; counts are independent per recipient.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BulkOutcome {
    pub success: u64,
    pub failed: u64,
}

/// Payload of queued notification work (`push-notification`,
/// `system-alert`, `email` message types).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub recipient_id: Option<i64>,
    /// Role-targeted broadcast when no single recipient is set.
    pub role: Option<String>,
    pub notification: Notification,
    #[serde(default)]
    pub options: SendOptions,
}

/// Fans queued and direct notifications out to every eligible channel of a
/// recipient, aggregates per-endpoint outcomes into one verdict, and writes
/// exactly one NotificationRecord per dispatch.
pub struct NotificationDispatcher {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
    channels: ChannelRegistry,
    realtime_bus: broadcast::Sender<RealtimeEvent>,
}

impl NotificationDispatcher {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
        channels: ChannelRegistry,
        realtime_bus: broadcast::Sender<RealtimeEvent>,
    ) -> Self {
        Self {
            pool,
            clock,
            config,
            channels,
            realtime_bus,
        }
    }

    /// Deliver to every eligible endpoint of one recipient. Returns whether
    /// at least one endpoint accepted the notification.
    pub async fn send_to_recipient(
        &self,
        recipient_id: i64,
        notification: &Notification,
        options: &SendOptions,
    ) -> AppResult<bool> {
        Ok(self
            .dispatch_to_recipient(recipient_id, notification, options)
            .await?
            .delivered())
    }

    /// Full-outcome variant of [`send_to_recipient`], used by the queue
    /// handler to distinguish "nothing to do" from "everything failed".
    ///
    /// [`send_to_recipient`]: NotificationDispatcher::send_to_recipient
    pub async fn dispatch_to_recipient(
        &self,
        recipient_id: i64,
        notification: &Notification,
        options: &SendOptions,
    ) -> AppResult<DispatchOutcome> {
        let mut endpoints = DeviceRepository::find_active_by_recipient(&self.pool, recipient_id)
            .await?;

        if let Some(allowed) = &options.channels {
            endpoints.retain(|endpoint| {
                endpoint
                    .channel()
                    .map(|channel| allowed.contains(&channel))
                    .unwrap_or(false)
            });
        }

        if endpoints.is_empty() {
            tracing::debug!(recipient_id, "No active endpoints, skipping dispatch");
            self.write_record(recipient_id, notification, options, false)
                .await?;
            return Ok(DispatchOutcome::NoEndpoints);
        }

        let preferences =
            PreferencesRepository::get_or_create(&self.pool, recipient_id, self.clock.now())
                .await?;

        // Emergency sends ignore category gating with one exception: an
        // explicit system-alerts opt-out still wins. User preference is
        // authoritative.
        let allowed = if options.emergency {
            preferences.system_alerts
        } else {
            options
                .category
                .map(|category| preferences.allows(category))
                .unwrap_or(true)
        };

        if !allowed {
            tracing::debug!(
                recipient_id,
                category = ?options.category,
                "Notification gated by recipient preferences"
            );
            self.write_record(recipient_id, notification, options, false)
                .await?;
            return Ok(DispatchOutcome::Gated);
        }

        let sends = endpoints
            .iter()
            .map(|endpoint| self.send_to_endpoint(endpoint, notification, options));
        let results = join_all(sends).await;
        let delivered = results.iter().any(|sent| *sent);

        self.write_record(recipient_id, notification, options, delivered)
            .await?;

        if delivered {
            Ok(DispatchOutcome::Delivered)
        } else {
            Ok(DispatchOutcome::AllFailed)
        }
    }

    /// One endpoint send. Failures are isolated here so a broken channel
    /// never blocks another channel's attempt.
    async fn send_to_endpoint(
        &self,
        endpoint: &DeviceEndpoint,
        notification: &Notification,
        options: &SendOptions,
    ) -> bool {
        let Some(channel) = endpoint.channel() else {
            tracing::warn!(
                endpoint_id = %endpoint.id,
                channel = %endpoint.channel,
                "Endpoint has unknown channel identifier"
            );
            return false;
        };

        let Some(sender) = self.channels.get(channel) else {
            tracing::warn!(
                channel = channel.as_str(),
                "No sender registered for channel"
            );
            return false;
        };

        match sender.send(endpoint, notification, options).await {
            Ok(()) => true,
            Err(AppError::PermanentSend(reason)) => {
                tracing::warn!(
                    endpoint_id = %endpoint.id,
                    recipient_id = endpoint.recipient_id,
                    channel = channel.as_str(),
                    reason = %reason,
                    "Permanent send failure, deactivating endpoint"
                );
                if let Err(e) =
                    DeviceRepository::deactivate(&self.pool, &endpoint.id, self.clock.now()).await
                {
                    tracing::warn!(endpoint_id = %endpoint.id, "Failed to deactivate endpoint: {:?}", e);
                }
                false
            }
            Err(e) => {
                tracing::warn!(
                    endpoint_id = %endpoint.id,
                    recipient_id = endpoint.recipient_id,
                    channel = channel.as_str(),
                    "Channel send failed: {:?}",
                    e
                );
                false
            }
        }
    }

    /// Send to many recipients in bounded batches with a short pause in
    /// between, so a large fan-out cannot spike concurrency.
    pub async fn send_bulk(
        &self,
        recipient_ids: &[i64],
        notification: &Notification,
        options: &SendOptions,
    ) -> AppResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let batch_size = self.config.bulk_batch_size.max(1);

        for (index, batch) in recipient_ids.chunks(batch_size).enumerate() {
            if index > 0 && self.config.bulk_pause_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.bulk_pause_ms))
                    .await;
            }

            let sends = batch
                .iter()
                .map(|recipient_id| self.send_to_recipient(*recipient_id, notification, options));

            for (recipient_id, result) in batch.iter().zip(join_all(sends).await) {
                match result {
                    Ok(true) => outcome.success += 1,
                    Ok(false) => outcome.failed += 1,
                    Err(e) => {
                        tracing::warn!(recipient_id, "Bulk send failed for recipient: {:?}", e);
                        outcome.failed += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Resolve the recipient set for a role from the device registry, then
    /// delegate to [`send_bulk`].
    ///
    /// [`send_bulk`]: NotificationDispatcher::send_bulk
    pub async fn send_to_role(
        &self,
        role: &str,
        notification: &Notification,
        options: &SendOptions,
    ) -> AppResult<BulkOutcome> {
        let recipient_ids = DeviceRepository::recipient_ids_by_role(&self.pool, role).await?;

        tracing::info!(
            role,
            recipients = recipient_ids.len(),
            "Sending role-targeted notification"
        );

        self.send_bulk(&recipient_ids, notification, options).await
    }

    /// Emergency broadcast: critical priority, short fixed TTL, and gating
    /// reduced to the system-alerts opt-out.
    pub async fn send_emergency(
        &self,
        recipient_ids: &[i64],
        notification: &Notification,
    ) -> AppResult<BulkOutcome> {
        let options = SendOptions {
            priority: Some(Priority::Critical),
            category: Some(NotificationCategory::SystemAlerts),
            ttl_seconds: Some(self.config.emergency_ttl_seconds),
            emergency: true,
            channels: None,
        };

        self.send_bulk(recipient_ids, notification, &options).await
    }

    async fn write_record(
        &self,
        recipient_id: i64,
        notification: &Notification,
        options: &SendOptions,
        success: bool,
    ) -> AppResult<()> {
        let category = options
            .category
            .map(|category| category.as_str().to_string())
            .unwrap_or_else(|| "general".to_string());

        RecordRepository::create(
            &self.pool,
            CreateNotificationRecord {
                recipient_id,
                title: notification.title.clone(),
                body: notification.body.clone(),
                category,
                success,
            },
            self.clock.now(),
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MessageHandler for NotificationDispatcher {
    async fn handle(&self, message: &QueueMessage) -> AppResult<()> {
        match message.message_type.as_str() {
            // Raw realtime events bypass endpoint resolution and go straight
            // to the socket bus.
            "realtime-event" => {
                let payload: serde_json::Value =
                    serde_json::from_str(&message.payload).map_err(|e| {
                        AppError::Validation(format!("Malformed realtime payload: {}", e))
                    })?;

                let subscribers = self
                    .realtime_bus
                    .send(RealtimeEvent {
                        recipient_id: message.recipient_id,
                        payload,
                    })
                    .unwrap_or(0);

                tracing::debug!(
                    message_id = %message.id,
                    subscribers,
                    "Broadcast queued realtime event"
                );
                Ok(())
            }
            "push-notification" | "system-alert" | "email" => {
                let mut job: NotificationJob =
                    serde_json::from_str(&message.payload).map_err(|e| {
                        AppError::Validation(format!("Malformed notification payload: {}", e))
                    })?;

                if message.message_type == "email" {
                    job.options.channels = Some(vec![Channel::Email]);
                }
                if message.message_type == "system-alert" && job.options.category.is_none() {
                    job.options.category = Some(NotificationCategory::SystemAlerts);
                }

                match (job.recipient_id.or(message.recipient_id), job.role.as_deref()) {
                    (Some(recipient_id), _) => {
                        let outcome = self
                            .dispatch_to_recipient(recipient_id, &job.notification, &job.options)
                            .await?;

                        // Gated or endpoint-less dispatches are done; only a
                        // full send failure is worth a retry.
                        if outcome == DispatchOutcome::AllFailed {
                            return Err(AppError::TransientSend(
                                "All channel sends failed".to_string(),
                            ));
                        }
                        Ok(())
                    }
                    (None, Some(role)) => {
                        self.send_to_role(role, &job.notification, &job.options)
                            .await?;
                        Ok(())
                    }
                    (None, None) => Err(AppError::Validation(
                        "Notification message has neither recipient nor role".to_string(),
                    )),
                }
            }
            other => Err(AppError::Validation(format!(
                "Unknown message type: {}",
                other
            ))),
        }
    }
}

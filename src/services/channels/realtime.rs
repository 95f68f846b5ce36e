use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::models::{Channel, DeviceEndpoint};
use crate::error::AppResult;
use crate::services::channels::ChannelSender;
use crate::services::dispatcher::{Notification, SendOptions};

/// Event published on the in-process realtime bus. Socket gateways
/// subscribe to the bus and forward events to their connected clients.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeEvent {
    pub recipient_id: Option<i64>,
    pub payload: serde_json::Value,
}

/// Realtime socket broadcast. Delivery is best-effort: a recipient without
/// a connected socket simply misses the event.
pub struct RealtimeSender {
    bus: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeSender {
    pub fn new(bus: broadcast::Sender<RealtimeEvent>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ChannelSender for RealtimeSender {
    fn channel(&self) -> Channel {
        Channel::Realtime
    }

    async fn send(
        &self,
        endpoint: &DeviceEndpoint,
        notification: &Notification,
        _options: &SendOptions,
    ) -> AppResult<()> {
        let event = RealtimeEvent {
            recipient_id: Some(endpoint.recipient_id),
            payload: serde_json::json!({
                "title": notification.title,
                "body": notification.body,
                "icon": notification.icon,
                "data": notification.data,
            }),
        };

        let subscribers = self.bus.send(event).unwrap_or(0);
        tracing::debug!(
            recipient_id = endpoint.recipient_id,
            subscribers,
            "Broadcast realtime notification"
        );

        Ok(())
    }
}

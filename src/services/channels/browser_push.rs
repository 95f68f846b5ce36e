use std::time::Duration;

use async_trait::async_trait;

use crate::db::models::{Channel, DeviceEndpoint};
use crate::error::{AppError, AppResult};
use crate::services::channels::ChannelSender;
use crate::services::dispatcher::{Notification, SendOptions};

/// Browser push delivery. The endpoint token is the push subscription URL;
/// the notification is POSTed to it as JSON. Gone subscriptions (404/410)
/// are permanent failures so the endpoint gets deactivated.
pub struct BrowserPushSender {
    client: reqwest::Client,
}

impl BrowserPushSender {
    pub fn new(timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds.max(1)))
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

#[async_trait]
impl ChannelSender for BrowserPushSender {
    fn channel(&self) -> Channel {
        Channel::BrowserPush
    }

    async fn send(
        &self,
        endpoint: &DeviceEndpoint,
        notification: &Notification,
        options: &SendOptions,
    ) -> AppResult<()> {
        let subscription = url::Url::parse(&endpoint.token)
            .map_err(|_| AppError::PermanentSend("Invalid subscription endpoint URL".to_string()))?;

        if !matches!(subscription.scheme(), "http" | "https") {
            return Err(AppError::PermanentSend(format!(
                "Unsupported subscription scheme: {}",
                subscription.scheme()
            )));
        }

        let body = serde_json::json!({
            "title": notification.title,
            "body": notification.body,
            "icon": notification.icon,
            "data": notification.data,
            "ttl": options.ttl_seconds,
        });

        let response = self
            .client
            .post(subscription)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::TransientSend(format!("Browser push request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                recipient_id = endpoint.recipient_id,
                status = status.as_u16(),
                "Browser push delivered"
            );
            return Ok(());
        }

        // 404/410 mean the subscription no longer exists.
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(AppError::PermanentSend(
                "Push subscription is gone".to_string(),
            ));
        }

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(AppError::TransientSend(format!(
                "Push endpoint returned {}",
                status
            )));
        }

        Err(AppError::PermanentSend(format!(
            "Push endpoint rejected notification with {}",
            status
        )))
    }
}

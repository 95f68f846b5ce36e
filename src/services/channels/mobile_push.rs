use async_trait::async_trait;

use crate::db::models::{Channel, DeviceEndpoint};
use crate::error::{AppError, AppResult};
use crate::services::channels::ChannelSender;
use crate::services::dispatcher::{Notification, SendOptions};

/// Mobile push delivery, one instance per platform (APNs / FCM).
///
/// The concrete provider bridge is an external collaborator; this sender
/// validates the device token and emits the delivery as a structured event
/// the bridge consumes.
pub struct MobilePushSender {
    platform: Channel,
}

impl MobilePushSender {
    pub fn ios() -> Self {
        Self {
            platform: Channel::MobilePushIos,
        }
    }

    pub fn android() -> Self {
        Self {
            platform: Channel::MobilePushAndroid,
        }
    }
}

fn validate_device_token(token: &str) -> Result<(), String> {
    if token.is_empty() {
        return Err("Device token cannot be empty".to_string());
    }

    if token.len() < 20 {
        return Err("Device token too short (minimum 20 characters)".to_string());
    }

    if token.len() > 200 {
        return Err("Device token too long (maximum 200 characters)".to_string());
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err("Device token contains invalid characters".to_string());
    }

    Ok(())
}

#[async_trait]
impl ChannelSender for MobilePushSender {
    fn channel(&self) -> Channel {
        self.platform
    }

    async fn send(
        &self,
        endpoint: &DeviceEndpoint,
        notification: &Notification,
        options: &SendOptions,
    ) -> AppResult<()> {
        validate_device_token(&endpoint.token).map_err(AppError::PermanentSend)?;

        tracing::info!(
            platform = self.platform.as_str(),
            recipient_id = endpoint.recipient_id,
            title = %notification.title,
            ttl_seconds = ?options.ttl_seconds,
            "Dispatched mobile push notification"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_tokens() {
        assert!(validate_device_token("").is_err());
        assert!(validate_device_token("short").is_err());
        assert!(validate_device_token(&"x".repeat(250)).is_err());
        assert!(validate_device_token("has spaces in the token value").is_err());
    }

    #[test]
    fn accepts_provider_shaped_tokens() {
        assert!(validate_device_token("dGhpcy1pcy1hLXZhbGlkLXRva2Vu:APA91b").is_ok());
        assert!(validate_device_token(&"a".repeat(64)).is_ok());
    }
}

use async_trait::async_trait;

use crate::db::models::{Channel, DeviceEndpoint};
use crate::error::{AppError, AppResult};
use crate::services::channels::ChannelSender;
use crate::services::dispatcher::{Notification, SendOptions};

/// Email delivery. The endpoint token is the recipient address; the mail
/// relay is an external collaborator consuming the emitted event.
#[derive(Default)]
pub struct EmailSender;

impl EmailSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        endpoint: &DeviceEndpoint,
        notification: &Notification,
        _options: &SendOptions,
    ) -> AppResult<()> {
        let address = endpoint.token.trim();
        if address.is_empty() || !address.contains('@') {
            return Err(AppError::PermanentSend(format!(
                "Invalid email address: {}",
                address
            )));
        }

        tracing::info!(
            recipient_id = endpoint.recipient_id,
            subject = %notification.title,
            "Handed notification to mail relay"
        );

        Ok(())
    }
}

use async_trait::async_trait;

use crate::db::models::{Channel, DeviceEndpoint};
use crate::error::{AppError, AppResult};
use crate::services::channels::ChannelSender;
use crate::services::dispatcher::{Notification, SendOptions};

/// SMS delivery. The endpoint token is the phone number in E.164-ish form;
/// the SMS gateway is an external collaborator consuming the emitted event.
#[derive(Default)]
pub struct SmsSender;

impl SmsSender {
    pub fn new() -> Self {
        Self
    }
}

fn validate_phone_number(number: &str) -> Result<(), String> {
    let trimmed = number.trim();
    if trimmed.is_empty() {
        return Err("Phone number cannot be empty".to_string());
    }

    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("Invalid phone number: {}", number));
    }

    Ok(())
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(
        &self,
        endpoint: &DeviceEndpoint,
        notification: &Notification,
        _options: &SendOptions,
    ) -> AppResult<()> {
        validate_phone_number(&endpoint.token).map_err(AppError::PermanentSend)?;

        tracing::info!(
            recipient_id = endpoint.recipient_id,
            body_len = notification.body.len(),
            "Handed notification to SMS gateway"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_validation() {
        assert!(validate_phone_number("+4915123456789").is_ok());
        assert!(validate_phone_number("015123456789").is_ok());
        assert!(validate_phone_number("").is_err());
        assert!(validate_phone_number("+49 151 234").is_err());
        assert!(validate_phone_number("not-a-number").is_err());
    }
}

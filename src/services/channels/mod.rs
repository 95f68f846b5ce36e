//! Channel-specific delivery implementations.
//!
//! Every channel implements [`ChannelSender`] and is registered in a
//! [`ChannelRegistry`] keyed by channel identifier. Concrete provider
//! integrations (APNs, FCM, mail/SMS gateways) are external collaborators;
//! the bundled mobile/email/SMS senders validate the endpoint and hand the
//! message to the platform's delivery bridge, which they represent as
//! structured log events.

pub mod browser_push;
pub mod email;
pub mod mobile_push;
pub mod realtime;
pub mod sms;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::config::DispatchConfig;
use crate::db::models::{Channel, DeviceEndpoint};
use crate::error::AppResult;
use crate::services::dispatcher::{Notification, SendOptions};

pub use browser_push::BrowserPushSender;
pub use email::EmailSender;
pub use mobile_push::MobilePushSender;
pub use realtime::{RealtimeEvent, RealtimeSender};
pub use sms::SmsSender;

/// A single delivery mechanism. Implementations must isolate their own
/// failures: an error affects only the endpoint being sent to.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender serves.
    fn channel(&self) -> Channel;

    /// Deliver `notification` to one endpoint. `AppError::PermanentSend`
    /// marks the endpoint as unusable (it will be deactivated);
    /// `AppError::TransientSend` is worth retrying.
    async fn send(
        &self,
        endpoint: &DeviceEndpoint,
        notification: &Notification,
        options: &SendOptions,
    ) -> AppResult<()>;
}

/// Lookup table of channel senders, keyed by channel identifier.
#[derive(Default)]
pub struct ChannelRegistry {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelSender>> {
        self.senders.get(&channel).cloned()
    }

    /// Registry with every bundled sender wired in.
    pub fn standard(
        config: &DispatchConfig,
        realtime_bus: broadcast::Sender<RealtimeEvent>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MobilePushSender::ios()));
        registry.register(Arc::new(MobilePushSender::android()));
        registry.register(Arc::new(BrowserPushSender::new(
            config.browser_push_timeout_seconds,
        )));
        registry.register(Arc::new(EmailSender::new()));
        registry.register(Arc::new(SmsSender::new()));
        registry.register(Arc::new(RealtimeSender::new(realtime_bus)));
        registry
    }
}

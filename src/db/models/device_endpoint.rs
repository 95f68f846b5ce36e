use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Delivery channel an endpoint is addressable on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    MobilePushIos,
    MobilePushAndroid,
    BrowserPush,
    Email,
    Sms,
    Realtime,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::MobilePushIos => "mobile-push-ios",
            Channel::MobilePushAndroid => "mobile-push-android",
            Channel::BrowserPush => "browser-push",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Realtime => "realtime",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mobile-push-ios" => Some(Channel::MobilePushIos),
            "mobile-push-android" => Some(Channel::MobilePushAndroid),
            "browser-push" => Some(Channel::BrowserPush),
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            "realtime" => Some(Channel::Realtime),
            _ => None,
        }
    }
}

/// A recipient's addressable delivery target on one channel.
///
/// At most one row exists per (`recipient_id`, `token`); re-registration
/// updates in place. Unregistering deactivates the row but keeps it for the
/// audit trail.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    pub id: String,
    pub recipient_id: i64,

    /// Channel identifier; see [`Channel`].
    pub channel: String,

    /// Channel-specific address: push token, subscription URL, email
    /// address, phone number, or socket session key.
    pub token: String,

    /// Role of the owning recipient ('consumer', 'merchant', 'driver',
    /// 'admin'). The registry doubles as the identity source for role
    /// fan-out.
    pub recipient_role: String,

    /// Client-reported device details (JSON).
    pub device_info: Option<String>,

    pub is_active: bool,
    pub last_used_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl DeviceEndpoint {
    pub fn channel(&self) -> Option<Channel> {
        Channel::from_str(&self.channel)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDevice {
    pub recipient_id: i64,
    pub token: String,
    pub channel: Channel,
    pub recipient_role: Option<String>,
    pub device_info: Option<serde_json::Value>,
}

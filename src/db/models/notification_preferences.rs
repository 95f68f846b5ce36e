use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Notification category a message belongs to; each category is gated by
/// one preference flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    OrderUpdates,
    PaymentNotifications,
    Promotions,
    SystemAlerts,
    ChatMessages,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::OrderUpdates => "order-updates",
            NotificationCategory::PaymentNotifications => "payment-notifications",
            NotificationCategory::Promotions => "promotions",
            NotificationCategory::SystemAlerts => "system-alerts",
            NotificationCategory::ChatMessages => "chat-messages",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "order-updates" => Some(NotificationCategory::OrderUpdates),
            "payment-notifications" => Some(NotificationCategory::PaymentNotifications),
            "promotions" => Some(NotificationCategory::Promotions),
            "system-alerts" => Some(NotificationCategory::SystemAlerts),
            "chat-messages" => Some(NotificationCategory::ChatMessages),
            _ => None,
        }
    }
}

/// Per-recipient category opt-in flags. All default to true; a recipient
/// without a row gets implicit defaults.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub id: String,
    pub recipient_id: i64,
    pub order_updates: bool,
    pub payment_notifications: bool,
    pub promotions: bool,
    pub system_alerts: bool,
    pub chat_messages: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NotificationPreferences {
    /// Whether the given category is currently opted in.
    pub fn allows(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::OrderUpdates => self.order_updates,
            NotificationCategory::PaymentNotifications => self.payment_notifications,
            NotificationCategory::Promotions => self.promotions,
            NotificationCategory::SystemAlerts => self.system_alerts,
            NotificationCategory::ChatMessages => self.chat_messages,
        }
    }
}

/// Merge-update request; missing fields retain their prior values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateNotificationPreferences {
    pub order_updates: Option<bool>,
    pub payment_notifications: Option<bool>,
    pub promotions: Option<bool>,
    pub system_alerts: Option<bool>,
    pub chat_messages: Option<bool>,
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Priority tier of a queued message. Determines drain order across queues
/// and contributes a fixed offset to the message score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Tiers in strict drain order.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Priority::Critical),
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    /// Score offset in milliseconds. Higher priorities sort far ahead of
    /// their due time so they always precede lower tiers with comparable
    /// due times; within one tier ordering degrades to FIFO by due time.
    pub fn offset_millis(&self) -> i64 {
        match self {
            Priority::Critical => -86_400_000,
            Priority::High => -3_600_000,
            Priority::Normal => 0,
            Priority::Low => 3_600_000,
        }
    }
}

/// Queue ordering score: due time plus the tier offset, lower sorts first.
pub fn score_for(due_at: NaiveDateTime, priority: Priority) -> i64 {
    due_at.and_utc().timestamp_millis() + priority.offset_millis()
}

/// A unit of work in the delivery queue.
///
/// Messages live in exactly one active queue (the global queue or a
/// recipient's private queue), ordered by `score`. On success the row is
/// deleted; once `attempts` reaches `max_attempts` it is moved verbatim to
/// the dead-letter table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Primary key (UUID), generated at enqueue time.
    pub id: String,

    /// Tag selecting the handler ('push-notification', 'system-alert',
    /// 'realtime-event', 'email').
    pub message_type: String,

    /// Opaque JSON payload, interpreted only by the type's handler.
    pub payload: String,

    /// Priority tier: 'critical', 'high', 'normal', 'low'. Immutable.
    pub priority: String,

    /// 'global' or 'recipient' (the recipient's private queue).
    pub queue_scope: String,

    /// Owning recipient for recipient-scoped work; absent for broadcast work.
    pub recipient_id: Option<i64>,

    /// Ordering score; see [`score_for`].
    pub score: i64,

    /// Number of delivery attempts already made.
    pub attempts: i32,

    /// Retry budget before the message is dead-lettered.
    pub max_attempts: i32,

    /// 'pending' or 'processing' (claimed by an in-flight dispatch).
    pub status: String,

    /// Last error observed when an attempt failed.
    pub last_error: Option<String>,

    /// Free-form diagnostic annotations (JSON).
    pub metadata: Option<String>,

    pub created_at: NaiveDateTime,

    /// Creation time plus the optional enqueue delay; the message is not
    /// released before this.
    pub due_at: NaiveDateTime,

    /// Optional TTL; expired messages are dead-lettered instead of dispatched.
    pub expires_at: Option<NaiveDateTime>,

    /// Set when a tick claims the message; stale claims past the lease
    /// window are released back to the queue.
    pub claimed_at: Option<NaiveDateTime>,

    pub updated_at: NaiveDateTime,
}

impl QueueMessage {
    pub fn priority(&self) -> Priority {
        Priority::from_str(&self.priority).unwrap_or(Priority::Normal)
    }
}

/// Data required to enqueue a new message. Scheduling fields are derived by
/// the repository from the enqueue time.
#[derive(Debug, Clone)]
pub struct CreateQueueMessage {
    pub message_type: String,
    pub payload: serde_json::Value,
    pub priority: Priority,

    /// `Some` routes the message to that recipient's private queue.
    pub recipient_id: Option<i64>,

    pub max_attempts: i32,

    /// Delay before the message becomes due (seconds).
    pub delay_seconds: Option<i64>,

    /// Time-to-live (seconds); the message is dropped to dead-letter once past it.
    pub expires_in_seconds: Option<i64>,

    pub metadata: Option<serde_json::Value>,
}

/// A message that exhausted its retry budget (or expired), parked for
/// inspection. Never re-entered into an active queue.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    pub id: String,
    pub message_type: String,
    pub payload: String,
    pub priority: String,
    pub queue_scope: String,
    pub recipient_id: Option<i64>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub metadata: Option<String>,
    pub created_at: NaiveDateTime,
    pub failed_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> NaiveDateTime {
        chrono::DateTime::from_timestamp(secs, 0).unwrap().naive_utc()
    }

    #[test]
    fn priority_roundtrip() {
        for p in Priority::ALL {
            assert_eq!(Priority::from_str(p.as_str()), Some(p));
        }
        assert_eq!(Priority::from_str("urgent"), None);
    }

    #[test]
    fn score_orders_tiers_before_arrival() {
        let early = at(1_700_000_000);
        let late = at(1_700_000_120);

        // A critical message arriving later still scores ahead of an earlier
        // normal one.
        assert!(score_for(late, Priority::Critical) < score_for(early, Priority::Normal));
        assert!(score_for(late, Priority::High) < score_for(early, Priority::Normal));
        assert!(score_for(early, Priority::Normal) < score_for(early, Priority::Low));
    }

    #[test]
    fn score_is_fifo_within_tier() {
        let first = at(1_700_000_000);
        let second = at(1_700_000_001);
        assert!(score_for(first, Priority::Normal) < score_for(second, Priority::Normal));
        assert!(score_for(first, Priority::Critical) < score_for(second, Priority::Critical));
    }
}

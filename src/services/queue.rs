use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::db::models::{CreateQueueMessage, Priority, QueueMessage};
use crate::db::repository::queue_repository::QueueScope;
use crate::db::QueueRepository;
use crate::error::{AppError, AppResult};

/// Options accepted at enqueue time.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub priority: Option<Priority>,
    pub max_attempts: Option<i32>,
    /// Delay before the message becomes due (seconds).
    pub delay_seconds: Option<i64>,
    /// Time-to-live; once past it the message is dead-lettered unprocessed.
    pub expires_in_seconds: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Depths of the global queue, split by tier.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TierDepths {
    pub critical: i64,
    pub high: i64,
    pub normal: i64,
    pub low: i64,
}

/// Observability snapshot; the only engine state exposed for health checks.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub global: TierDepths,
    /// Number of non-empty per-recipient queues.
    pub recipient_queues: i64,
    /// Total messages across all per-recipient queues.
    pub recipient_depth: i64,
    pub dead_letter_depth: i64,
}

/// What `fail` did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    Rescheduled { due_at: NaiveDateTime },
    DeadLettered,
}

/// The queue manager: accepts work from producers, owns retry/backoff and
/// dead-letter routing, and hands ready batches to the scheduler.
///
/// The manager never interprets payloads; an `Err` returned by the message
/// handler is the only failure signal it understands.
pub struct QueueService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
}

impl QueueService {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self {
            pool,
            clock,
            config,
        }
    }

    /// Insert a message into the global priority queue. Non-blocking; the
    /// returned id is the producer's only handle on the work.
    pub async fn enqueue(
        &self,
        message_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> AppResult<String> {
        self.enqueue_scoped(message_type, payload, None, options)
            .await
    }

    /// Insert into the recipient's private queue, keeping that recipient's
    /// processing independent of global load.
    pub async fn enqueue_for_recipient(
        &self,
        recipient_id: i64,
        message_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> AppResult<String> {
        self.enqueue_scoped(message_type, payload, Some(recipient_id), options)
            .await
    }

    async fn enqueue_scoped(
        &self,
        message_type: &str,
        payload: serde_json::Value,
        recipient_id: Option<i64>,
        options: EnqueueOptions,
    ) -> AppResult<String> {
        if message_type.trim().is_empty() {
            return Err(AppError::Validation(
                "Message type cannot be empty".to_string(),
            ));
        }

        let priority = options.priority.unwrap_or(Priority::Normal);
        let message = CreateQueueMessage {
            message_type: message_type.to_string(),
            payload,
            priority,
            recipient_id,
            max_attempts: options
                .max_attempts
                .unwrap_or(self.config.default_max_attempts)
                .max(1),
            delay_seconds: options.delay_seconds,
            expires_in_seconds: options.expires_in_seconds,
            metadata: options.metadata,
        };

        let created = QueueRepository::create(&self.pool, message, self.clock.now()).await?;

        tracing::debug!(
            message_id = %created.id,
            message_type = %created.message_type,
            priority = %created.priority,
            recipient_id = ?created.recipient_id,
            due_at = %created.due_at,
            "Enqueued message"
        );

        Ok(created.id)
    }

    /// Claim up to the configured batch of due messages from one queue and
    /// tier. Used by the scheduler tick.
    pub async fn claim_due(
        &self,
        scope: QueueScope,
        priority: Priority,
    ) -> AppResult<Vec<QueueMessage>> {
        QueueRepository::claim_due(
            &self.pool,
            scope,
            priority,
            self.config.batch_size,
            self.clock.now(),
        )
        .await
    }

    /// Return abandoned in-flight messages to their queues. Attempts are not
    /// incremented: the handler never reported an outcome.
    pub async fn release_stale_claims(&self) -> AppResult<u64> {
        let now = self.clock.now();
        let cutoff = now - Duration::seconds(self.config.claim_lease_seconds);
        QueueRepository::release_stale_claims(&self.pool, cutoff, now).await
    }

    /// Recipients whose private queues have due work.
    pub async fn active_recipients(&self) -> AppResult<Vec<i64>> {
        QueueRepository::active_recipient_ids(&self.pool, self.clock.now()).await
    }

    /// Discard a message that was handled successfully.
    pub async fn complete(&self, id: &str) -> AppResult<()> {
        QueueRepository::delete(&self.pool, id).await
    }

    /// Record a failed attempt: reschedule with exponential backoff while
    /// budget remains, dead-letter otherwise. Non-retryable errors
    /// short-circuit straight to the dead-letter queue.
    pub async fn fail(&self, message: &QueueMessage, error: &AppError) -> AppResult<FailureOutcome> {
        let attempts = message.attempts + 1;
        let reason = error.to_string();

        if !error.is_retryable() || attempts >= message.max_attempts {
            self.dead_letter_with_attempts(message, attempts, &reason)
                .await?;
            tracing::warn!(
                message_id = %message.id,
                attempts,
                max_attempts = message.max_attempts,
                error = %reason,
                "Message moved to dead-letter queue"
            );
            return Ok(FailureOutcome::DeadLettered);
        }

        let delay = backoff_delay(
            message.attempts,
            self.config.base_retry_delay_seconds,
            self.config.max_backoff_seconds,
        );
        let now = self.clock.now();
        let due_at = now + Duration::seconds(delay);

        QueueRepository::reschedule(
            &self.pool,
            &message.id,
            due_at,
            message.priority(),
            Some(reason.clone()),
            now,
        )
        .await?;

        tracing::debug!(
            message_id = %message.id,
            attempts,
            due_at = %due_at,
            error = %reason,
            "Message rescheduled after failure"
        );

        Ok(FailureOutcome::Rescheduled { due_at })
    }

    /// Park a message in the dead-letter queue without consuming an attempt
    /// (expired messages, unroutable types).
    pub async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> AppResult<()> {
        self.dead_letter_with_attempts(message, message.attempts, reason)
            .await
    }

    async fn dead_letter_with_attempts(
        &self,
        message: &QueueMessage,
        attempts: i32,
        reason: &str,
    ) -> AppResult<()> {
        QueueRepository::move_to_dead_letter(
            &self.pool,
            message,
            attempts,
            Some(reason.to_string()),
            self.clock.now(),
        )
        .await
    }

    pub async fn stats(&self) -> AppResult<QueueStats> {
        let mut global = TierDepths::default();
        for (priority, depth) in QueueRepository::global_depth_by_priority(&self.pool).await? {
            match Priority::from_str(&priority) {
                Some(Priority::Critical) => global.critical = depth,
                Some(Priority::High) => global.high = depth,
                Some(Priority::Normal) => global.normal = depth,
                Some(Priority::Low) => global.low = depth,
                None => tracing::warn!(priority = %priority, "Unknown priority tier in queue"),
            }
        }

        let recipient_depths = QueueRepository::recipient_queue_depths(&self.pool).await?;
        let recipient_queues = recipient_depths.len() as i64;
        let recipient_depth = recipient_depths.iter().map(|(_, depth)| depth).sum();

        Ok(QueueStats {
            global,
            recipient_queues,
            recipient_depth,
            dead_letter_depth: QueueRepository::dead_letter_depth(&self.pool).await?,
        })
    }

    /// Bounded-retention safety valve: purge queue and dead-letter entries
    /// older than `max_age`, regardless of state.
    pub async fn cleanup(&self, max_age: Duration) -> AppResult<u64> {
        let cutoff = self.clock.now() - max_age;
        let purged_queue = QueueRepository::purge_queue_older_than(&self.pool, cutoff).await?;
        let purged_dead = QueueRepository::purge_dead_letters_older_than(&self.pool, cutoff).await?;

        if purged_queue + purged_dead > 0 {
            tracing::info!(
                purged_queue,
                purged_dead,
                cutoff = %cutoff,
                "Purged aged queue entries"
            );
        }

        Ok(purged_queue + purged_dead)
    }
}

/// Exponential backoff: `base * 2^attempts`, capped. `attempts` is the count
/// of failures before the current one, so the first retry waits `base`.
fn backoff_delay(attempts: i32, base_seconds: i64, max_seconds: i64) -> i64 {
    let exponent = attempts.clamp(0, 30) as u32;
    base_seconds
        .saturating_mul(1i64 << exponent)
        .min(max_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(0, 30, 3600), 30);
        assert_eq!(backoff_delay(1, 30, 3600), 60);
        assert_eq!(backoff_delay(2, 30, 3600), 120);
        assert_eq!(backoff_delay(3, 30, 3600), 240);
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(10, 30, 3600), 3600);
        // Absurd attempt counts must not overflow.
        assert_eq!(backoff_delay(500, 30, 3600), 3600);
    }
}

use chrono::{Duration, NaiveDateTime};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{score_for, CreateQueueMessage, DeadLetterMessage, Priority, QueueMessage};
use crate::error::{AppError, AppResult};

/// Which queue a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueScope {
    Global,
    Recipient(i64),
}

/// Repository for the persistent delivery queue and its dead-letter store.
///
/// Implementation notes:
/// - Claiming uses an atomic single-statement UPDATE with a subselect:
///   `UPDATE ... WHERE id = (SELECT id FROM ... LIMIT 1) RETURNING ...`
///   This avoids a long-lived transaction and guarantees two concurrent
///   ticks never claim the same message.
/// - All scheduling timestamps are passed in by the caller so the queue can
///   run against an injected clock.
pub struct QueueRepository;

impl QueueRepository {
    /// Insert a new message. `due_at`, `expires_at` and `score` are derived
    /// from `now` and the creation options.
    pub async fn create(
        pool: &SqlitePool,
        message: CreateQueueMessage,
        now: NaiveDateTime,
    ) -> AppResult<QueueMessage> {
        let id = Uuid::new_v4().to_string();
        let due_at = now + Duration::seconds(message.delay_seconds.unwrap_or(0).max(0));
        let expires_at = message
            .expires_in_seconds
            .map(|secs| now + Duration::seconds(secs.max(0)));
        let score = score_for(due_at, message.priority);
        let queue_scope = if message.recipient_id.is_some() {
            "recipient"
        } else {
            "global"
        };
        let payload = message.payload.to_string();
        let metadata = message.metadata.map(|m| m.to_string());

        let row = sqlx::query_as::<_, QueueMessage>(
            r#"
            INSERT INTO queue_messages (
                id, message_type, payload, priority, queue_scope, recipient_id,
                score, attempts, max_attempts, status, last_error, metadata,
                created_at, due_at, expires_at, claimed_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, 'pending', NULL, ?, ?, ?, ?, NULL, ?)
            RETURNING
                id, message_type, payload, priority, queue_scope, recipient_id,
                score, attempts, max_attempts, status, last_error, metadata,
                created_at, due_at, expires_at, claimed_at, updated_at
            "#,
        )
        .bind(id)
        .bind(message.message_type)
        .bind(payload)
        .bind(message.priority.as_str())
        .bind(queue_scope)
        .bind(message.recipient_id)
        .bind(score)
        .bind(message.max_attempts)
        .bind(metadata)
        .bind(now)
        .bind(due_at)
        .bind(expires_at)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Claim up to `limit` due messages from one queue and tier, in score
    /// order. Claimed rows move to 'processing' with `claimed_at = now`.
    pub async fn claim_due(
        pool: &SqlitePool,
        scope: QueueScope,
        priority: Priority,
        limit: i64,
        now: NaiveDateTime,
    ) -> AppResult<Vec<QueueMessage>> {
        let mut messages: Vec<QueueMessage> = Vec::new();
        if limit <= 0 {
            return Ok(messages);
        }

        for _ in 0..(limit as usize) {
            let opt = match scope {
                QueueScope::Global => {
                    sqlx::query_as::<_, QueueMessage>(
                        r#"
                        UPDATE queue_messages
                        SET status = 'processing', claimed_at = ?, updated_at = ?
                        WHERE id = (
                            SELECT id FROM queue_messages
                            WHERE status = 'pending'
                              AND queue_scope = 'global'
                              AND priority = ?
                              AND due_at <= ?
                            ORDER BY score ASC
                            LIMIT 1
                        )
                        RETURNING
                            id, message_type, payload, priority, queue_scope, recipient_id,
                            score, attempts, max_attempts, status, last_error, metadata,
                            created_at, due_at, expires_at, claimed_at, updated_at
                        "#,
                    )
                    .bind(now)
                    .bind(now)
                    .bind(priority.as_str())
                    .bind(now)
                    .fetch_optional(pool)
                    .await
                }
                QueueScope::Recipient(recipient_id) => {
                    sqlx::query_as::<_, QueueMessage>(
                        r#"
                        UPDATE queue_messages
                        SET status = 'processing', claimed_at = ?, updated_at = ?
                        WHERE id = (
                            SELECT id FROM queue_messages
                            WHERE status = 'pending'
                              AND queue_scope = 'recipient'
                              AND recipient_id = ?
                              AND priority = ?
                              AND due_at <= ?
                            ORDER BY score ASC
                            LIMIT 1
                        )
                        RETURNING
                            id, message_type, payload, priority, queue_scope, recipient_id,
                            score, attempts, max_attempts, status, last_error, metadata,
                            created_at, due_at, expires_at, claimed_at, updated_at
                        "#,
                    )
                    .bind(now)
                    .bind(now)
                    .bind(recipient_id)
                    .bind(priority.as_str())
                    .bind(now)
                    .fetch_optional(pool)
                    .await
                }
            }
            .map_err(AppError::Database)?;

            if let Some(message) = opt {
                messages.push(message);
            } else {
                break;
            }
        }

        Ok(messages)
    }

    /// Release 'processing' rows whose claim is older than `cutoff` back to
    /// 'pending'. The attempt counter stays untouched: an abandoned handler
    /// never reported an outcome.
    pub async fn release_stale_claims(
        pool: &SqlitePool,
        cutoff: NaiveDateTime,
        now: NaiveDateTime,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE queue_messages
            SET status = 'pending', claimed_at = NULL, updated_at = ?
            WHERE status = 'processing'
              AND claimed_at IS NOT NULL
              AND claimed_at <= ?
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Re-score a failed message for its next attempt: increment `attempts`,
    /// move `due_at` forward and return it to 'pending'.
    pub async fn reschedule(
        pool: &SqlitePool,
        id: &str,
        due_at: NaiveDateTime,
        priority: Priority,
        last_error: Option<String>,
        now: NaiveDateTime,
    ) -> AppResult<QueueMessage> {
        let score = score_for(due_at, priority);

        let row = sqlx::query_as::<_, QueueMessage>(
            r#"
            UPDATE queue_messages
            SET attempts = attempts + 1,
                due_at = ?,
                score = ?,
                status = 'pending',
                claimed_at = NULL,
                last_error = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING
                id, message_type, payload, priority, queue_scope, recipient_id,
                score, attempts, max_attempts, status, last_error, metadata,
                created_at, due_at, expires_at, claimed_at, updated_at
            "#,
        )
        .bind(due_at)
        .bind(score)
        .bind(last_error)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Delete a message that completed successfully.
    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Move a message verbatim to the dead-letter table and remove it from
    /// its active queue. The attempt counter recorded is the message's
    /// current one plus the failed attempt that triggered the move.
    pub async fn move_to_dead_letter(
        pool: &SqlitePool,
        message: &QueueMessage,
        attempts: i32,
        last_error: Option<String>,
        now: NaiveDateTime,
    ) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO dead_letter_messages (
                id, message_type, payload, priority, queue_scope, recipient_id,
                attempts, max_attempts, last_error, metadata, created_at, failed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.message_type)
        .bind(&message.payload)
        .bind(&message.priority)
        .bind(&message.queue_scope)
        .bind(message.recipient_id)
        .bind(attempts)
        .bind(message.max_attempts)
        .bind(last_error)
        .bind(&message.metadata)
        .bind(message.created_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        sqlx::query("DELETE FROM queue_messages WHERE id = ?")
            .bind(&message.id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;

        Ok(())
    }

    /// Recipients that currently have due pending messages in their private
    /// queues. Drives the per-recipient drain phase of each tick.
    pub async fn active_recipient_ids(
        pool: &SqlitePool,
        now: NaiveDateTime,
    ) -> AppResult<Vec<i64>> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT recipient_id FROM queue_messages
            WHERE queue_scope = 'recipient'
              AND recipient_id IS NOT NULL
              AND status = 'pending'
              AND due_at <= ?
            ORDER BY recipient_id
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<QueueMessage>> {
        sqlx::query_as::<_, QueueMessage>(
            r#"
            SELECT
                id, message_type, payload, priority, queue_scope, recipient_id,
                score, attempts, max_attempts, status, last_error, metadata,
                created_at, due_at, expires_at, claimed_at, updated_at
            FROM queue_messages
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Queue depth per priority tier for the global queue.
    pub async fn global_depth_by_priority(pool: &SqlitePool) -> AppResult<Vec<(String, i64)>> {
        sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT priority, COUNT(*) FROM queue_messages
            WHERE queue_scope = 'global'
            GROUP BY priority
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// (recipient, depth) for every non-empty private queue.
    pub async fn recipient_queue_depths(pool: &SqlitePool) -> AppResult<Vec<(i64, i64)>> {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT recipient_id, COUNT(*) FROM queue_messages
            WHERE queue_scope = 'recipient' AND recipient_id IS NOT NULL
            GROUP BY recipient_id
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn dead_letter_depth(pool: &SqlitePool) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM dead_letter_messages")
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn list_dead_letters(
        pool: &SqlitePool,
        limit: i64,
    ) -> AppResult<Vec<DeadLetterMessage>> {
        sqlx::query_as::<_, DeadLetterMessage>(
            r#"
            SELECT
                id, message_type, payload, priority, queue_scope, recipient_id,
                attempts, max_attempts, last_error, metadata, created_at, failed_at
            FROM dead_letter_messages
            ORDER BY failed_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Purge queue entries created before `cutoff`, regardless of state.
    pub async fn purge_queue_older_than(
        pool: &SqlitePool,
        cutoff: NaiveDateTime,
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE created_at < ?")
            .bind(cutoff)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Purge dead-letter entries that failed before `cutoff`.
    pub async fn purge_dead_letters_older_than(
        pool: &SqlitePool,
        cutoff: NaiveDateTime,
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM dead_letter_messages WHERE failed_at < ?")
            .bind(cutoff)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}

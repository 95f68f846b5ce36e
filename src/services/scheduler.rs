use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::db::models::{Priority, QueueMessage};
use crate::db::repository::queue_repository::QueueScope;
use crate::error::AppResult;
use crate::services::queue::{FailureOutcome, QueueService};

/// Consumes released queue messages. One handler is registered per message
/// type; an `Err` from `handle` is the queue's only failure signal and
/// drives retry/dead-letter routing.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &QueueMessage) -> AppResult<()>;
}

/// Periodic queue drainer.
///
/// Each tick releases stale in-flight claims, then drains up to the
/// configured batch per queue: the global queue tier by tier in strict
/// priority order, then every recipient queue the same way. Released
/// messages are dispatched on their own tokio tasks; the loop does not wait
/// for handler completion before the next tick.
pub struct Scheduler {
    queue: Arc<QueueService>,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    shutdown: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(queue: Arc<QueueService>, clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            queue,
            clock,
            config,
            handlers: HashMap::new(),
            shutdown,
        }
    }

    /// Route messages of `message_type` to `handler`. Messages with no
    /// registered handler are dead-lettered at release time.
    pub fn register_handler(&mut self, message_type: &str, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(message_type.to_string(), handler);
    }

    /// One scheduler iteration. Returns the join handles of the dispatched
    /// handler tasks so tests can await completion; the run loop drops them.
    pub async fn tick(&self) -> AppResult<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        match self.queue.release_stale_claims().await {
            Ok(0) => {}
            Ok(released) => {
                tracing::info!(released, "Released stale in-flight claims back to queue")
            }
            Err(e) => tracing::warn!("Failed to release stale claims: {:?}", e),
        }

        for priority in Priority::ALL {
            match self.queue.claim_due(QueueScope::Global, priority).await {
                Ok(batch) => {
                    for message in batch {
                        self.dispatch(message, &mut handles).await;
                    }
                }
                // A store failure affects only this queue for this tick; the
                // messages were never claimed and will surface again.
                Err(e) => tracing::warn!(
                    priority = priority.as_str(),
                    "Failed to drain global queue: {:?}",
                    e
                ),
            }
        }

        let recipients = match self.queue.active_recipients().await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::warn!("Failed to list active recipient queues: {:?}", e);
                Vec::new()
            }
        };

        for recipient_id in recipients {
            for priority in Priority::ALL {
                match self
                    .queue
                    .claim_due(QueueScope::Recipient(recipient_id), priority)
                    .await
                {
                    Ok(batch) => {
                        for message in batch {
                            self.dispatch(message, &mut handles).await;
                        }
                    }
                    Err(e) => tracing::warn!(
                        recipient_id,
                        priority = priority.as_str(),
                        "Failed to drain recipient queue: {:?}",
                        e
                    ),
                }
            }
        }

        Ok(handles)
    }

    /// Hand one claimed message to its handler on a fresh task. Expired and
    /// unroutable messages are dead-lettered here instead.
    async fn dispatch(&self, message: QueueMessage, handles: &mut Vec<JoinHandle<()>>) {
        let now = self.clock.now();

        if message.expires_at.is_some_and(|expires_at| expires_at <= now) {
            tracing::info!(
                message_id = %message.id,
                message_type = %message.message_type,
                "Message expired before dispatch, moving to dead-letter queue"
            );
            if let Err(e) = self.queue.dead_letter(&message, "expired").await {
                tracing::warn!(message_id = %message.id, "Failed to dead-letter expired message: {:?}", e);
            }
            return;
        }

        let Some(handler) = self.handlers.get(&message.message_type).cloned() else {
            tracing::warn!(
                message_id = %message.id,
                message_type = %message.message_type,
                "No handler registered for message type, moving to dead-letter queue"
            );
            if let Err(e) = self
                .queue
                .dead_letter(&message, "no handler registered for message type")
                .await
            {
                tracing::warn!(message_id = %message.id, "Failed to dead-letter unroutable message: {:?}", e);
            }
            return;
        };

        let queue = self.queue.clone();
        handles.push(tokio::spawn(async move {
            match handler.handle(&message).await {
                Ok(()) => {
                    if let Err(e) = queue.complete(&message.id).await {
                        tracing::warn!(
                            message_id = %message.id,
                            "Failed to remove completed message: {:?}",
                            e
                        );
                    }
                }
                Err(error) => match queue.fail(&message, &error).await {
                    Ok(FailureOutcome::Rescheduled { due_at }) => {
                        tracing::debug!(message_id = %message.id, due_at = %due_at, "Handler failed, retry scheduled");
                    }
                    Ok(FailureOutcome::DeadLettered) => {}
                    Err(e) => {
                        tracing::warn!(
                            message_id = %message.id,
                            "Failed to record handler failure: {:?}",
                            e
                        );
                    }
                },
            }
        }));
    }

    /// Spawn the run loop. The loop does not await handler join handles;
    /// completion flows back through the queue store, not the scheduler.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let scheduler = self;
        let mut shutdown_rx = scheduler.shutdown.subscribe();
        let interval = Duration::from_secs(scheduler.config.tick_interval_seconds.max(1));

        tokio::spawn(async move {
            tracing::info!(
                tick_interval_seconds = scheduler.config.tick_interval_seconds,
                batch_size = scheduler.config.batch_size,
                "Scheduler started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Scheduler shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = scheduler.tick().await {
                            tracing::warn!("Scheduler tick failed: {:?}", e);
                        }
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

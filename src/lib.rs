//! Asynchronous messaging and notification delivery engine for the
//! marketplace platform.
//!
//! The engine buffers outbound events (order updates, payment confirmations,
//! system alerts, chat pings) in priority- and recipient-scoped queues and
//! fans each one out to the recipient's registered delivery channels,
//! honoring per-user opt-outs and retrying failures with exponential backoff.

use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;

use clock::Clock;
use config::Config;
use services::dispatcher::NotificationDispatcher;
use services::queue::QueueService;

/// Embedded migrations, shared by the binary and the test suites.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub queue: Arc<QueueService>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use notification_engine::clock::ManualClock;
use notification_engine::config::{Config, DispatchConfig, QueueConfig};
use notification_engine::db::models::{Channel, DeviceEndpoint, RegisterDevice};
use notification_engine::db::DeviceRepository;
use notification_engine::error::{AppError, AppResult};
use notification_engine::services::channels::{ChannelRegistry, ChannelSender, RealtimeEvent};
use notification_engine::services::dispatcher::{
    Notification, NotificationDispatcher, SendOptions,
};

/// Fresh single-connection in-memory database with migrations applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");

    notification_engine::MIGRATOR
        .run(&pool)
        .await
        .expect("migrations failed");

    pool
}

pub fn epoch() -> NaiveDateTime {
    chrono::DateTime::from_timestamp(1_700_000_000, 0)
        .unwrap()
        .naive_utc()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(epoch()))
}

pub fn test_queue_config() -> QueueConfig {
    Config::default().queue
}

pub fn test_dispatch_config() -> DispatchConfig {
    let mut config = Config::default().dispatch;
    config.bulk_pause_ms = 0;
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehavior {
    Succeed,
    FailTransient,
    FailPermanent,
}

/// Channel sender stub that records every attempted token.
pub struct StubSender {
    channel: Channel,
    behavior: SendBehavior,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl StubSender {
    pub fn new(channel: Channel, behavior: SendBehavior) -> Arc<Self> {
        Arc::new(Self {
            channel,
            behavior,
            sent: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn sent_tokens(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for StubSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        endpoint: &DeviceEndpoint,
        _notification: &Notification,
        _options: &SendOptions,
    ) -> AppResult<()> {
        self.sent.lock().unwrap().push(endpoint.token.clone());

        match self.behavior {
            SendBehavior::Succeed => Ok(()),
            SendBehavior::FailTransient => Err(AppError::TransientSend(
                "stub channel unavailable".to_string(),
            )),
            SendBehavior::FailPermanent => {
                Err(AppError::PermanentSend("stub token rejected".to_string()))
            }
        }
    }
}

/// Dispatcher wired to the given senders and a fresh realtime bus.
pub fn dispatcher_with(
    pool: &SqlitePool,
    clock: Arc<ManualClock>,
    senders: Vec<Arc<dyn ChannelSender>>,
) -> (Arc<NotificationDispatcher>, broadcast::Sender<RealtimeEvent>) {
    let (bus, _) = broadcast::channel(64);
    let mut registry = ChannelRegistry::new();
    for sender in senders {
        registry.register(sender);
    }

    let dispatcher = Arc::new(NotificationDispatcher::new(
        pool.clone(),
        clock,
        test_dispatch_config(),
        registry,
        bus.clone(),
    ));

    (dispatcher, bus)
}

pub async fn register_endpoint(
    pool: &SqlitePool,
    recipient_id: i64,
    token: &str,
    channel: Channel,
    role: &str,
    now: NaiveDateTime,
) -> DeviceEndpoint {
    DeviceRepository::register(
        pool,
        RegisterDevice {
            recipient_id,
            token: token.to_string(),
            channel,
            recipient_role: Some(role.to_string()),
            device_info: None,
        },
        now,
    )
    .await
    .expect("failed to register endpoint")
}

pub fn notification(title: &str) -> Notification {
    Notification {
        title: title.to_string(),
        body: format!("{} body", title),
        icon: None,
        data: None,
    }
}

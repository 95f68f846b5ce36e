use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by the CORS layer. When unset the API allows any origin
    /// (the service normally sits behind the platform's internal gateway).
    pub cors_origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Scheduler tick interval in seconds.
    pub tick_interval_seconds: u64,
    /// Maximum ready items released per queue per tick.
    pub batch_size: i64,
    /// Default retry budget for messages that don't specify one.
    pub default_max_attempts: i32,
    /// Base delay in seconds for exponential retry backoff.
    pub base_retry_delay_seconds: i64,
    /// Cap for exponential backoff (seconds).
    pub max_backoff_seconds: i64,
    /// How long a claimed (in-flight) message may stay unacknowledged before
    /// the scheduler releases it back to its queue.
    pub claim_lease_seconds: i64,
    /// How often (seconds) the retention worker runs.
    pub cleanup_interval_seconds: u64,
    /// Queue and dead-letter entries older than this are purged by cleanup.
    pub max_age_hours: i64,
    /// Device endpoints unused for this many days are deactivated.
    pub stale_device_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Recipients per batch for bulk sends.
    pub bulk_batch_size: usize,
    /// Pause between bulk batches (milliseconds) to bound peak fan-out.
    pub bulk_pause_ms: u64,
    /// Time-to-live forced onto emergency notifications (seconds).
    pub emergency_ttl_seconds: i64,
    /// Per-request timeout for browser push delivery (seconds).
    pub browser_push_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                cors_origin: env::var("CORS_ORIGIN").ok(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/notifications.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            queue: QueueConfig {
                tick_interval_seconds: env::var("QUEUE_TICK_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1u64),
                batch_size: env::var("QUEUE_BATCH_SIZE")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10i64),
                default_max_attempts: env::var("QUEUE_DEFAULT_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3i32),
                base_retry_delay_seconds: env::var("QUEUE_BASE_RETRY_DELAY_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30i64),
                max_backoff_seconds: env::var("QUEUE_MAX_BACKOFF_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600i64),
                claim_lease_seconds: env::var("QUEUE_CLAIM_LEASE_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60i64),
                cleanup_interval_seconds: env::var("QUEUE_CLEANUP_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600u64),
                max_age_hours: env::var("QUEUE_MAX_AGE_HOURS")
                    .unwrap_or_else(|_| "72".to_string())
                    .parse()
                    .unwrap_or(72i64),
                stale_device_days: env::var("STALE_DEVICE_DAYS")
                    .unwrap_or_else(|_| "90".to_string())
                    .parse()
                    .unwrap_or(90i64),
            },
            dispatch: DispatchConfig {
                bulk_batch_size: env::var("DISPATCH_BULK_BATCH_SIZE")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100usize),
                bulk_pause_ms: env::var("DISPATCH_BULK_PAUSE_MS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100u64),
                emergency_ttl_seconds: env::var("DISPATCH_EMERGENCY_TTL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300i64),
                browser_push_timeout_seconds: env::var("BROWSER_PUSH_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10u64),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                cors_origin: None,
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 5,
            },
            queue: QueueConfig {
                tick_interval_seconds: 1,
                batch_size: 10,
                default_max_attempts: 3,
                base_retry_delay_seconds: 30,
                max_backoff_seconds: 3600,
                claim_lease_seconds: 60,
                cleanup_interval_seconds: 3600,
                max_age_hours: 72,
                stale_device_days: 90,
            },
            dispatch: DispatchConfig {
                bulk_batch_size: 100,
                bulk_pause_ms: 100,
                emergency_ttl_seconds: 300,
                browser_push_timeout_seconds: 10,
            },
        }
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notification_engine::clock::SystemClock;
use notification_engine::config::Config;
use notification_engine::routes;
use notification_engine::services::channels::ChannelRegistry;
use notification_engine::services::dispatcher::NotificationDispatcher;
use notification_engine::services::init;
use notification_engine::services::queue::QueueService;
use notification_engine::services::scheduler::Scheduler;
use notification_engine::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notification_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting notification delivery engine");

    // Initialize database
    let pool = init::init_db(&config).await?;

    // Core services share an injected clock so scheduling stays testable.
    let clock = Arc::new(SystemClock);
    let (realtime_bus, _) = tokio::sync::broadcast::channel(256);

    let queue = Arc::new(QueueService::new(
        pool.clone(),
        clock.clone(),
        config.queue.clone(),
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        pool.clone(),
        clock.clone(),
        config.dispatch.clone(),
        ChannelRegistry::standard(&config.dispatch, realtime_bus.clone()),
        realtime_bus,
    ));

    let mut scheduler = Scheduler::new(queue.clone(), clock.clone(), config.queue.clone());
    for message_type in ["push-notification", "system-alert", "realtime-event", "email"] {
        scheduler.register_handler(message_type, dispatcher.clone());
    }
    let scheduler = Arc::new(scheduler);

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        clock,
        queue,
        dispatcher,
    });

    // Create shutdown notifier for background workers
    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    // Spawn the scheduler loop and maintenance workers
    let mut bg_handles = vec![scheduler.clone().start()];
    bg_handles.extend(init::spawn_background_workers(
        app_state.clone(),
        shutdown_tx.clone(),
    ));

    // Build CORS layer; restricted to the configured origin when one is set.
    let cors = match &config.server.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .map_err(|_| anyhow::anyhow!("Invalid CORS_ORIGIN value"))?,
            )
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        None => CorsLayer::permissive(),
    };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Producer-facing queue API + observability surface
        .nest("/api/queue", routes::queue::router())
        // Direct notification sends and history
        .nest("/api/notifications", routes::notifications::router())
        // Device lifecycle
        .nest("/api/devices", routes::devices::router())
        // Category opt-in flags
        .nest("/api/preferences", routes::preferences::router())
        // Add shared state
        .with_state(app_state.clone())
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_tx_clone = shutdown_tx.clone();
    let scheduler_clone = scheduler.clone();

    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to bind SIGTERM");
            tokio::select! {
                _ = ctrl_c => {},
                _ = term.recv() => {},
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("Failed to bind Ctrl+C");
        }

        tracing::info!("Shutdown signal received, notifying background workers");
        scheduler_clone.stop();
        let _ = shutdown_tx_clone.send(());
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Signal handler completed; server future dropped to stop accepting new connections");
        }
    }

    // Give background workers some time to finish their work.
    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );

    let bg_wait = async {
        for handle in bg_handles {
            let _ = handle.await;
        }
    };
    let _ = tokio::time::timeout(shutdown_wait, bg_wait).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Bouncy endpoint - SNS webhook receiver for SES feedback.
//!
//! Verifies SNS deliveries, confirms subscriptions and turns SES bounce,
//! complaint and engagement events into per-recipient feedback records.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bouncy::dispatch::{FeedbackStore, LogStore, LoggingObserver, NotificationObserver};
use bouncy::fetch::HttpFetcher;
use bouncy::processor::Processor;
use bouncy::web::{build_router, AppState};
use bouncy::{Config, Publisher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        endpoint_path = %config.endpoint_path,
        topic_allow_list = ?config.topic_arns,
        auto_subscribe = config.auto_subscribe,
        verify_certificate = config.verify_certificate,
        key_cache = ?config.key_cache,
        use_tz = config.use_tz,
        feedback_queue_configured = config.feedback_amqp_url.is_some(),
        "config_loaded"
    );

    let publisher = config.feedback_amqp_url.clone().map(Publisher::new);
    let store: Arc<dyn FeedbackStore> = match &publisher {
        Some(p) => {
            info!("rabbitmq_publisher_created");
            Arc::new(p.clone())
        }
        None => {
            warn!("feedback_store_log_only");
            Arc::new(LogStore)
        }
    };

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_millis(
        config.request_timeout_ms,
    )));
    let observers: Vec<Arc<dyn NotificationObserver>> = vec![Arc::new(LoggingObserver)];

    let processor = Processor::from_config(&config, fetcher, store, observers)
        .context("Invalid SNS domain pattern")?;

    let state = AppState::new(config.clone(), processor);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(p) = publisher {
        p.close().await;
    }

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Completes when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kalshi_feed::alerting::AlertDispatcher;
use kalshi_feed::api::{create_router, run_alert_engine, run_signal_collector, ApiState};
use kalshi_feed::config::Config;
use kalshi_feed::scrapers::kalshi_rest::{run_market_poller, run_orderbook_poller, KalshiRestClient};
use kalshi_feed::scrapers::kalshi_ws::StreamHandler;
use kalshi_feed::signals::{SignalBus, SignalProcessor};
use kalshi_feed::state::StateEngine;

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    info!("starting kalshi feed");

    let config = Config::load().context("failed to load configuration")?;
    info!(
        base_url = %config.kalshi.api_base_url,
        bind = %config.api.bind_address,
        "configuration loaded"
    );

    let engine = Arc::new(StateEngine::new());

    // Signal fan-out: one bounded queue for the API window, one for the
    // dispatcher. Consumers must be registered before the bus is shared.
    let mut bus = SignalBus::new();
    let api_signal_rx = bus.add_consumer();
    let dispatcher_rx = bus.add_consumer();
    let bus = Arc::new(bus);

    let rest_client = Arc::new(
        KalshiRestClient::new(&config.kalshi, &config.ingestion)
            .context("failed to initialize REST client")?,
    );
    let stream_handler = StreamHandler::new(
        &config.kalshi.websocket_url,
        Duration::from_secs(config.ingestion.websocket_reconnect_delay_secs),
        engine.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Ingestion.
    tokio::spawn(run_market_poller(
        rest_client.clone(),
        engine.clone(),
        config.ingestion.series_category.clone(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(run_orderbook_poller(
        rest_client,
        engine.clone(),
        Duration::from_secs(config.ingestion.rest_poll_interval_secs),
        shutdown_rx.clone(),
    ));
    {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { stream_handler.run(shutdown).await });
    }

    // Analytics.
    let processor = SignalProcessor::new(engine.clone(), bus.clone(), config.signals.clone());
    {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { processor.run(shutdown).await });
    }

    // Outbound alerting.
    if config.alerting.enabled {
        let dispatcher = AlertDispatcher::new(
            &config.alerting,
            reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .context("failed to build webhook client")?,
        );
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run(dispatcher_rx, shutdown).await });
    } else {
        drop(dispatcher_rx);
        info!("alerting disabled");
    }

    // API state plus its two background feeds.
    let api_state = ApiState::new(engine.clone(), bus);
    tokio::spawn(run_signal_collector(
        api_state.signals.clone(),
        api_signal_rx,
        shutdown_rx.clone(),
    ));
    tokio::spawn(run_alert_engine(
        engine,
        api_state.alerts.clone(),
        shutdown_rx.clone(),
    ));

    let router = create_router(api_state).layer(cors_layer(&config.api.cors_origins));

    let listener = TcpListener::bind(&config.api.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.api.bind_address))?;
    info!(bind = %config.api.bind_address, "API server listening");

    // Ctrl-c flips the shutdown token every loop selects on.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut serve_shutdown = shutdown_rx;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.changed().await;
        })
        .await
        .context("API server failed")?;

    info!("shutdown complete");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

fn load_env() {
    // Standard dotenv search, then the manifest directory for runs started
    // elsewhere in the tree.
    let _ = dotenv();
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kalshi_feed=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

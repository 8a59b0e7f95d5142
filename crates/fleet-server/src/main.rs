//! Fleet Server - live fleet tracking and playback telemetry sync

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fleet_server::cache::RangeCache;
use fleet_server::config::Config;
use fleet_server::state::AppState;
use fleet_server::{api, ingest, loops};
use fleet_telemetry::TelemetryApiClient;
use fleet_transport::{SubscribeOptions, TransportClient, TransportOptions};

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("fleet_server=debug".parse()?)
        .add_directive("fleet_transport=info".parse()?);
    let json = std::env::var("LOG_FORMAT")
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    tracing::info!("Starting Fleet Server...");

    let config = Config::from_env().context("invalid configuration")?;
    let options = TransportOptions::from_url(&config.broker_url, config.client_id.clone())
        .context("cannot construct transport client")?;
    let transport = TransportClient::new(options);

    let api_client = TelemetryApiClient::new(
        config.telemetry_api_url.clone(),
        config.telemetry_api_token.clone(),
    )?;
    let cache = Arc::new(
        RangeCache::new(
            Arc::new(api_client),
            config.range_cache_max_entries,
            config.range_cache_max_age,
        )
        .with_persistence(config.range_cache_path.clone()),
    );
    if let Err(err) = cache.load().await {
        tracing::warn!(error = %err, "ignoring unreadable range cache");
    }

    let state = Arc::new(AppState::new(config.clone(), cache.clone()));
    let _observers = ingest::wire_dispatcher(&state, state.dispatcher());
    let _routing = state.dispatcher().attach(&transport);
    state.attach_transport(transport.clone());

    let shutdown = CancellationToken::new();

    // Start background loops
    tokio::spawn(loops::transport_loop::run_transport_loop(
        transport.clone(),
        config.topic_prefix.clone(),
        SubscribeOptions::qos(config.default_qos),
        shutdown.clone(),
    ));
    tokio::spawn(loops::smoothing_loop::run_smoothing_loop(
        state.clone(),
        config.frame_interval,
        shutdown.clone(),
    ));
    tokio::spawn(loops::playback_prune_loop::run_playback_prune_loop(
        state.clone(),
        shutdown.clone(),
    ));
    let cache_loop = tokio::spawn(loops::range_cache_loop::run_range_cache_loop(
        cache.clone(),
        shutdown.clone(),
    ));

    // Build the app
    let app = api::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Run server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(err) = transport.disconnect().await {
        tracing::warn!(error = %err, "broker disconnect failed");
    }
    let _ = cache_loop.await;
    tracing::info!("Fleet Server stopped");
    Ok(())
}

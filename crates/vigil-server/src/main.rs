//! # vigil-server
//!
//! Anonymous, location-tagged incident reporting with zone alerts.
//!
//! This binary provides:
//! - **Location anonymization**: coordinates are jittered and bucketed into
//!   ~100m zones before anything is stored
//! - **Transient report store**: reports expire after eight hours and are
//!   swept from memory on a fixed interval
//! - **Zone fan-out**: each new report is pushed to the topic of its zone and
//!   the eight neighbouring zones through a pluggable push transport
//! - **REST API** (axum) for submitting, querying and subscribing
//! - **Per-IP rate limiting** on the write endpoints

mod api;
mod clock;
mod config;
mod dispatcher;
mod error;
mod rate_limit;
mod sanitize;
mod service;
mod store;
mod subscriptions;
mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::clock::SystemClock;
use crate::config::{PushTransportKind, ServerConfig};
use crate::rate_limit::{Quota, RateLimiter};
use crate::sanitize::LengthCapSanitizer;
use crate::service::AlertService;
use crate::transport::{DisabledTransport, LogTransport, PushTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vigil_server=debug")),
        )
        .init();

    info!("Starting Vigil alert server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let transport: Arc<dyn PushTransport> = match config.push_transport {
        PushTransportKind::Disabled => {
            tracing::warn!("No push transport configured, alerts will not be delivered");
            Arc::new(DisabledTransport)
        }
        PushTransportKind::Log => Arc::new(LogTransport),
    };

    let service = Arc::new(AlertService::new(
        Arc::new(SystemClock),
        transport,
        Arc::new(LengthCapSanitizer::default()),
    ));

    let rate_limiter = RateLimiter::new(
        Quota::new(config.rate_limit_per_sec, config.rate_limit_burst),
        Quota::new(
            config.subscribe_rate_limit_per_sec,
            config.subscribe_rate_limit_burst,
        ),
    );

    let app_state = AppState {
        service: service.clone(),
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
        started_at: Instant::now(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Expired report sweep. Queries already hide expired reports; this only
    // reclaims memory.
    let _sweeper = service.store().spawn_sweeper(config.sweep_interval);

    // Periodic rate limiter cleanup (every 5 minutes, drop buckets idle >10 min)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_idle(Duration::from_secs(600)).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

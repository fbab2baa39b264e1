mod cache;
mod config;
mod handlers;
mod metrics;
mod models;
mod providers;
mod rate_limit;
mod state;
mod worker;

use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cache::ResponseCache;
use crate::config::Args;
use crate::handlers::{
    cache_clear_handler, cache_stats_handler, generate_handler, health_handler, metrics_handler,
};
use crate::models::BatchedRequest;
use crate::providers::ProviderPool;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();

    // invalid cache or backend configuration aborts startup
    let cache = match ResponseCache::new(args.cache_capacity, Duration::from_secs(args.cache_ttl)) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!("invalid cache configuration: {e}");
            std::process::exit(1);
        }
    };
    let providers = match ProviderPool::new(&args.backends) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            error!("invalid backend configuration: {e}");
            std::process::exit(1);
        }
    };

    let (batch_tx, batch_rx) = mpsc::channel::<BatchedRequest>(100);

    // creating shared state
    let state = Arc::new(AppState {
        client: reqwest::Client::new(),
        cache: Arc::clone(&cache),
        providers: Arc::clone(&providers),
        rate_limiter: DashMap::new(),
        rate_limit: args.rate_limit,
        rate_window: Duration::from_secs(args.rate_window),
        batch_tx,
    });

    // spawn the background worker and the backend health checker
    tokio::spawn(worker::batch_worker(
        batch_rx,
        reqwest::Client::new(),
        Arc::clone(&providers),
        cache,
    ));
    tokio::spawn(providers::health_checker(
        providers,
        reqwest::Client::new(),
        Duration::from_secs(args.health_interval),
    ));

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/cache/stats", get(cache_stats_handler))
        .route("/api/cache/clear", post(cache_clear_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");

    info!("gateway running on http://localhost:{}", args.port);
    info!("backends: {}", args.backends);
    info!(
        "cache: {} entries max, TTL {} seconds",
        args.cache_capacity, args.cache_ttl
    );
    info!(
        "rate limit: {} requests per {} seconds",
        args.rate_limit, args.rate_window
    );

    axum::serve(listener, app).await.expect("server error");
}

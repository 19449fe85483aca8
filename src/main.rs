// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! CleanBage Rewards API Server
//!
//! Tracks reward point balances, QR activation windows, and collector
//! scans, and fans state changes out to every subscribed view.

use cleanbage_rewards::{bus::NotificationBus, config::Config, store::KvStore, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting CleanBage Rewards API");

    // Open the reward store
    let store = match &config.data_path {
        Some(path) => KvStore::open(path).expect("Failed to open reward store"),
        None => {
            tracing::warn!("REWARDS_DATA_PATH not set, running with in-memory store");
            KvStore::in_memory()
        }
    };

    // The calendar-day markers are superseded by the 20h activation window
    let purged = store
        .purge_legacy_daily_markers()
        .expect("Failed to purge legacy markers");
    if purged > 0 {
        tracing::info!(purged, "Removed legacy daily collection markers");
    }

    // Wire the notification bus and bridge the store change feed onto it
    let bus = NotificationBus::new();
    bus.bridge_store(store.clone());

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), store, bus));

    // Build router
    let app = cleanbage_rewards::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cleanbage_rewards=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Challenge-Tracker API Server
//!
//! Syncs daily steps and weight from Google Fit and keeps challenge
//! leaderboards up to date.

use challenge_tracker::{
    config::{Config, StoreKind},
    db::{FirestoreDb, MemoryDb},
    services::{GoogleFitClient, KmsService, SyncScheduler},
    AppState, Stores,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, store = ?config.store, "Starting Challenge-Tracker API");

    let stores = match config.store {
        StoreKind::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore");

            let kms = KmsService::new(
                &config.gcp_project_id,
                &config.gcp_region,
                "token-encryption",
            )
            .await
            .expect("Failed to initialize KMS service");
            tracing::info!("KMS service initialized");

            Stores::firestore(db, kms)
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Stores::memory(MemoryDb::new())
        }
    };

    let provider =
        GoogleFitClient::new(&config.google_fit_base_url, config.sync.provider_timeout)
            .expect("Failed to build Google Fit client");

    // Build shared state
    let state = Arc::new(
        AppState::new(config.clone(), stores, Arc::new(provider))
            .expect("Failed to initialize application state"),
    );

    // Periodic sync of every connected user
    let scheduler = SyncScheduler::new(state.sync.clone(), config.sync.interval);
    scheduler.spawn();
    tracing::info!(
        interval_secs = config.sync.interval.as_secs(),
        "Sync scheduler started"
    );

    // Build router
    let app = challenge_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("challenge_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

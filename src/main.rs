// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! edit Aja API Server
//!
//! Backend for the edit Aja photo styling app: Firebase sign-in, Midtrans
//! diamond top-ups, image uploads and Freepik style generation.

use anyhow::Context;
use edit_aja::{config::Config, db::FirestoreDb, services::FirebaseAuthVerifier, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        midtrans_production = config.midtrans_is_production,
        "Starting edit Aja API"
    );

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.firebase_project_id)
        .await
        .context("Failed to connect to Firestore")?;

    let auth =
        FirebaseAuthVerifier::new(&config).context("Failed to initialize token verifier")?;

    // Build shared state
    let port = config.port;
    let state = Arc::new(AppState::new(config, db, auth));

    // Build router
    let app = edit_aja::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("edit_aja=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! edit Aja: backend API for AI photo styling.
//!
//! This crate provides the HTTP API behind the edit Aja web app: Firebase
//! sign-in, diamond top-ups through Midtrans, photo uploads to the image
//! host, and style generation through Freepik.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use services::{
    FirebaseAuthVerifier, FreepikClient, GenerationService, GeoLocator, ImageHostClient,
    LedgerService, MidtransClient, TopupService,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub auth: FirebaseAuthVerifier,
    pub ledger: LedgerService,
    pub topups: TopupService,
    pub image_host: ImageHostClient,
    pub generations: GenerationService,
    pub geo: GeoLocator,
    /// Serializes beta registrations so the slot count is not overrun.
    pub beta_lock: tokio::sync::Mutex<()>,
}

impl AppState {
    /// Wire services from configuration using the default remote endpoints.
    pub fn new(config: Config, db: FirestoreDb, auth: FirebaseAuthVerifier) -> Self {
        let midtrans = MidtransClient::new(
            config.midtrans_server_key.clone(),
            config.midtrans_is_production,
        );
        let freepik = FreepikClient::new(config.freepik_api_key.clone());
        Self::with_clients(config, db, auth, midtrans, freepik, GeoLocator::new())
    }

    /// Wire services around pre-built API clients (tests point these at mocks).
    pub fn with_clients(
        config: Config,
        db: FirestoreDb,
        auth: FirebaseAuthVerifier,
        midtrans: MidtransClient,
        freepik: FreepikClient,
        geo: GeoLocator,
    ) -> Self {
        let ledger = LedgerService::new(db.clone());
        let topups = TopupService::new(
            db.clone(),
            ledger.clone(),
            midtrans,
            config.frontend_url.clone(),
            config.midtrans_client_key.clone(),
        );
        let image_host =
            ImageHostClient::new(&config.image_host_url, config.image_host_api_key.clone());
        let generations = GenerationService::new(
            db.clone(),
            ledger.clone(),
            freepik,
            &config.image_host_url,
            config.max_upload_bytes,
        );

        Self {
            config,
            db,
            auth,
            ledger,
            topups,
            image_host,
            generations,
            geo,
            beta_lock: tokio::sync::Mutex::new(()),
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod analytics;
pub mod compress;
pub mod firebase_auth;
pub mod freepik;
pub mod generation;
pub mod geo;
pub mod image_host;
pub mod ledger;
pub mod midtrans;
pub mod topup;

pub use compress::{compress_image, CompressOptions, CompressedImage};
pub use firebase_auth::{AuthError, FirebaseAuthVerifier, VerifiedFirebaseUser};
pub use freepik::FreepikClient;
pub use generation::GenerationService;
pub use geo::GeoLocator;
pub use image_host::ImageHostClient;
pub use ledger::LedgerService;
pub use midtrans::MidtransClient;
pub use topup::TopupService;

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod beta;
pub mod favorite;
pub mod feedback;
pub mod generation;
pub mod settings;
pub mod style;
pub mod topup;
pub mod user;
pub mod visit;

pub use beta::BetaTester;
pub use favorite::Favorite;
pub use feedback::{Feedback, FeedbackStatus};
pub use generation::{Generation, GenerationStatus};
pub use settings::{Settings, TokenPackage};
pub use style::Style;
pub use topup::{TopupStatus, TopupTransaction};
pub use user::{User, UserRole};
pub use visit::Visit;

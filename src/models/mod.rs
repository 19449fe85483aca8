// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activation;
pub mod scan;
pub mod token;
pub mod user;

pub use activation::{ActivationStatus, QrActivationState};
pub use scan::{ScanOutcome, ScanRecord};
pub use token::RewardToken;
pub use user::{Role, UserAccount};

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod activation;
pub mod balance;
pub mod scan;
pub mod session;

pub use activation::ActivationService;
pub use balance::BalanceService;
pub use scan::{ActivityLedger, ScanPipeline};
pub use session::{PayloadSource, ScanSession, SessionHandle};

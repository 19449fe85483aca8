// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! CleanBage Rewards: reward ledger and cross-client synchronization core
//!
//! This crate provides the backend for the waste-management reward flow:
//! point balances, per-user QR activation windows, the collector scan
//! pipeline, and the notification bus that keeps every open view of a
//! user's data consistent.

pub mod bus;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod time_utils;

use bus::NotificationBus;
use config::Config;
use services::{ActivationService, ActivityLedger, BalanceService, ScanPipeline};
use store::KvStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: KvStore,
    pub bus: NotificationBus,
    pub balance: BalanceService,
    pub activation: ActivationService,
    pub ledger: ActivityLedger,
    pub pipeline: ScanPipeline,
}

impl AppState {
    /// Wire the service graph over a store and bus.
    pub fn new(config: Config, store: KvStore, bus: NotificationBus) -> Self {
        let balance = BalanceService::new(store.clone(), bus.clone());
        let activation = ActivationService::new(store.clone());
        let ledger = ActivityLedger::new(store.clone(), bus.clone());
        let pipeline = ScanPipeline::new(
            balance.clone(),
            activation.clone(),
            ledger.clone(),
            config.award_points,
        );

        Self {
            config,
            store,
            bus,
            balance,
            activation,
            ledger,
            pipeline,
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use cleanbage_rewards::bus::NotificationBus;
use cleanbage_rewards::config::Config;
use cleanbage_rewards::middleware::auth::create_jwt;
use cleanbage_rewards::models::{Role, UserAccount};
use cleanbage_rewards::routes::create_router;
use cleanbage_rewards::store::KvStore;
use cleanbage_rewards::AppState;
use std::sync::Arc;

/// Create a test app over an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let store = KvStore::in_memory();
    let bus = NotificationBus::new();
    let state = Arc::new(AppState::new(config, store, bus));
    (create_router(state.clone()), state)
}

/// Seed an account directly into the store.
#[allow(dead_code)]
pub fn seed_account(state: &AppState, user_id: &str, name: &str, role: Role, points: u64) {
    state
        .balance
        .set(&UserAccount {
            user_id: user_id.to_string(),
            name: name.to_string(),
            society: Some("Green Valley Society".to_string()),
            email: None,
            role,
            points,
        })
        .expect("Failed to seed account");
}

/// Mint a session JWT for a test user.
#[allow(dead_code)]
pub fn session_token(state: &AppState, user_id: &str, role: Role) -> String {
    create_jwt(user_id, role, &state.config.jwt_signing_key).expect("Failed to create JWT")
}

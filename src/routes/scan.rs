// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Collector routes: scan submission and scan history.
//!
//! The browser owns the camera; the decoded payload arrives here as
//! opaque text. These routes are gated on the collector role in addition
//! to session auth.

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::middleware::require_collector;
use crate::routes::api::ActivityEntry;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/scan", post(submit_scan))
        .route("/api/scan/history", get(get_scan_history))
        .route_layer(middleware::from_fn(require_collector))
}

#[derive(Deserialize)]
pub struct ScanRequest {
    /// Decoded QR payload, treated as opaque text until the pipeline
    /// parses it
    pub payload: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ScanResponse {
    pub user_id: String,
    pub user_name: String,
    pub points_awarded: u64,
    pub new_balance: u64,
}

/// Process one decoded payload into at most one award.
async fn submit_scan(
    State(state): State<Arc<AppState>>,
    Extension(collector): Extension<AuthUser>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>> {
    let outcome = state
        .pipeline
        .process_scan(&request.payload, &collector.user_id)?;

    Ok(Json(ScanResponse {
        user_id: outcome.user_id,
        user_name: outcome.user_name,
        points_awarded: outcome.points_awarded,
        new_balance: outcome.new_balance,
    }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ScanHistoryResponse {
    pub records: Vec<ActivityEntry>,
}

/// The collector's recent scans, newest first (bounded server-side).
async fn get_scan_history(
    State(state): State<Arc<AppState>>,
    Extension(collector): Extension<AuthUser>,
) -> Result<Json<ScanHistoryResponse>> {
    let records = state
        .ledger
        .history_for_collector(&collector.user_id)?
        .into_iter()
        .map(ActivityEntry::from)
        .collect();

    Ok(Json(ScanHistoryResponse { records }))
}

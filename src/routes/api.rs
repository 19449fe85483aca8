// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::bus::Event;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{RewardToken, ScanRecord};
use crate::services::scan::DEFAULT_FEED_LIMIT;
use crate::time_utils::{format_remaining, format_utc_rfc3339};
use crate::AppState;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/balance", get(get_balance))
        .route("/api/qr/token", post(issue_qr_token))
        .route("/api/qr/status", get(get_qr_status))
        .route("/api/activity", get(get_activity))
        .route("/api/events", get(get_events))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub user_id: String,
    pub name: String,
    pub society: Option<String>,
    pub role: String,
    pub points: u64,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let account = state
        .balance
        .get_account(&user.user_id)?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    Ok(Json(UserResponse {
        user_id: account.user_id,
        name: account.name,
        society: account.society,
        role: account.role.as_str().to_string(),
        points: account.points,
    }))
}

// ─── Balance ─────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BalanceResponse {
    pub user_id: String,
    pub points: u64,
}

/// Current point balance; 0 for a never-credited user.
async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<BalanceResponse>> {
    let points = state.balance.read(&user.user_id)?;
    Ok(Json(BalanceResponse {
        user_id: user.user_id,
        points,
    }))
}

// ─── QR Token & Activation ───────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct QrTokenResponse {
    /// JSON payload to encode into the QR presentation
    pub payload: String,
    pub issued_at: String,
    pub valid_until: String,
}

/// Issue a fresh display token for the session user.
async fn issue_qr_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<QrTokenResponse>> {
    let account = state
        .balance
        .get_account(&user.user_id)?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    let token = RewardToken::issue(&account, chrono::Utc::now());
    Ok(Json(QrTokenResponse {
        payload: token.to_payload()?,
        issued_at: format_utc_rfc3339(token.issued_at),
        valid_until: format_utc_rfc3339(token.valid_until),
    }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct QrStatusResponse {
    pub active: bool,
    pub reactivates_at: Option<String>,
    pub remaining_secs: Option<i64>,
    /// Humanized remaining cooldown, for direct display
    pub remaining: Option<String>,
}

/// Whether the session user's token may currently be redeemed.
async fn get_qr_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<QrStatusResponse>> {
    let status = state.activation.check_active(&user.user_id)?;
    Ok(Json(QrStatusResponse {
        active: status.active,
        reactivates_at: status.reactivates_at.map(format_utc_rfc3339),
        remaining_secs: status.remaining_secs,
        remaining: status.remaining_secs.map(format_remaining),
    }))
}

// ─── Activity Feed ───────────────────────────────────────────

#[derive(Deserialize)]
struct ActivityQuery {
    /// Visible window size
    #[serde(default = "default_limit")]
    limit: usize,
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_FEED_LIMIT
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: String,
    pub points_awarded: u64,
}

impl From<ScanRecord> for ActivityEntry {
    fn from(record: ScanRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            user_name: record.user_name,
            timestamp: format_utc_rfc3339(record.timestamp),
            points_awarded: record.points_awarded,
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivityResponse {
    pub records: Vec<ActivityEntry>,
    pub next_cursor: Option<String>,
}

/// De-duplicated activity feed for the session user, newest first.
async fn get_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityResponse>> {
    let limit = query.limit.clamp(1, 100);
    let offset = decode_cursor(query.cursor.as_deref())?;

    // Dedup runs over the full feed, then the cursor offsets into the
    // deduped view; offsetting first would let a duplicate pair straddle
    // a page boundary and survive.
    let all = crate::models::scan::dedup_for_display(state.ledger.all_for_user(&user.user_id)?);

    let page: Vec<ActivityEntry> = all
        .iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .map(ActivityEntry::from)
        .collect();

    let next_offset = offset + page.len();
    let next_cursor = (next_offset < all.len()).then(|| encode_cursor(next_offset));

    Ok(Json(ActivityResponse {
        records: page,
        next_cursor,
    }))
}

fn encode_cursor(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(format!("o:{}", offset))
}

fn decode_cursor(cursor: Option<&str>) -> Result<usize> {
    let Some(cursor) = cursor else {
        return Ok(0);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| AppError::BadRequest("invalid cursor".to_string()))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| AppError::BadRequest("invalid cursor".to_string()))?;
    text.strip_prefix("o:")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| AppError::BadRequest("invalid cursor".to_string()))
}

// ─── Event Stream ────────────────────────────────────────────

/// SSE stream of bus events for the session user.
///
/// This is the cross-context transport: a credit performed by a collector
/// elsewhere reaches this user's open views without polling.
async fn get_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let rx = state.bus.watch();

    let stream = stream::unfold((rx, user.user_id), |(mut rx, user_id)| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.user_id() != user_id {
                        continue;
                    }
                    match sse_event(&event) {
                        Some(sse) => return Some((Ok(sse), (rx, user_id))),
                        None => continue,
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "SSE subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &Event) -> Option<SseEvent> {
    SseEvent::default()
        .event(event.kind())
        .json_data(event)
        .ok()
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session bootstrap routes.
//!
//! The identity collaborator authenticates the user (passwords, role
//! authorization, community membership — all out of scope here) and hands
//! this service an HMAC-signed identity assertion. Verifying the
//! signature is the entire trust boundary: a valid assertion yields a
//! session JWT and an account record in the reward store.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE};
use crate::models::{Role, UserAccount};
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Assertions older than this are replayable stale state; reject them.
const ASSERTION_MAX_AGE_MILLIS: u128 = 10 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(bootstrap))
        .route("/session/logout", get(logout))
}

/// Identity payload carried inside a signed assertion.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPayload {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub society: Option<String>,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    pub role: Role,
    /// Starting balance, used only when no account exists yet
    #[serde(default)]
    pub points: u64,
}

#[derive(Deserialize)]
pub struct BootstrapRequest {
    pub assertion: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub points: u64,
}

/// Create a session from a signed identity assertion.
///
/// This is also the restore path: an existing account keeps its stored
/// balance (the reward store is the source of truth), while profile
/// fields refresh from the assertion.
async fn bootstrap(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<BootstrapRequest>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let payload = verify_assertion(&request.assertion, &state.config.identity_assertion_key)
        .ok_or(AppError::Unauthorized)?;

    payload
        .validate()
        .map_err(|e| AppError::BadRequest(format!("invalid identity payload: {}", e)))?;

    let existing = state.balance.get_account(&payload.user_id)?;
    let account = UserAccount {
        user_id: payload.user_id.clone(),
        name: payload.name.clone(),
        society: payload.society.clone(),
        email: payload.email.clone(),
        role: payload.role,
        points: existing.map(|a| a.points).unwrap_or(payload.points),
    };
    state.balance.set(&account)?;

    let jwt = create_jwt(&account.user_id, account.role, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    tracing::info!(user_id = %account.user_id, role = ?account.role, "Session bootstrapped");

    let cookie = Cookie::build((SESSION_COOKIE, jwt.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(30))
        .build();

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            token: jwt,
            user_id: account.user_id,
            name: account.name,
            role: account.role.as_str().to_string(),
            points: account.points,
        }),
    ))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Tear down the session cookie. The reward store keeps the account.
async fn logout(jar: CookieJar) -> (CookieJar, Json<LogoutResponse>) {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    (jar.add(cookie), Json(LogoutResponse { success: true }))
}

/// Sign an identity payload into an assertion.
///
/// Used by the identity collaborator (and tests); kept next to the
/// verifier so the two cannot drift.
pub fn sign_assertion(identity_json: &str, secret: &[u8]) -> anyhow::Result<String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("System time error: {}", e))?
        .as_millis();

    let payload = format!("{}|{:x}", identity_json, timestamp);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("HMAC init failed: {}", e))?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Verify HMAC signature and freshness, then decode the identity payload.
fn verify_assertion(assertion: &str, secret: &[u8]) -> Option<IdentityPayload> {
    let bytes = URL_SAFE_NO_PAD.decode(assertion).ok()?;
    let assertion_str = String::from_utf8(bytes).ok()?;

    // Format is "identity_json|timestamp_hex|signature_hex"; the JSON may
    // itself contain pipes, so split from the right.
    let mut parts = assertion_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let identity_json = parts.next()?;

    // Reconstruct payload and verify signature
    let payload = format!("{}|{}", identity_json, timestamp_hex);

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    let expected_signature = hex::encode(mac.finalize().into_bytes());

    if signature_hex != expected_signature {
        tracing::warn!("Identity assertion signature mismatch");
        return None;
    }

    let timestamp = u128::from_str_radix(timestamp_hex, 16).ok()?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_millis();
    if now.saturating_sub(timestamp) > ASSERTION_MAX_AGE_MILLIS {
        tracing::warn!("Identity assertion expired");
        return None;
    }

    serde_json::from_str(identity_json).ok()
}

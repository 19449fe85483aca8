// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward token: the payload encoded in a user's QR presentation.
//!
//! The token is informational only. It identifies the presenting user and
//! carries display metadata; whether it may be redeemed is decided by the
//! activation state, not by anything inside the token. In particular
//! `valid_until` is cosmetic and does not gate redemption.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::UserAccount;

/// Display validity stamped on issued tokens.
pub const TOKEN_VALIDITY_HOURS: i64 = 24;

/// Decoded QR payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardToken {
    /// Presenting user's ID (the only required field)
    pub user_id: String,
    /// Display name
    #[serde(default)]
    pub user_name: Option<String>,
    /// Display society
    #[serde(default)]
    pub society: Option<String>,
    /// When the presenting client generated this token
    pub issued_at: DateTime<Utc>,
    /// Cosmetic expiry (issued_at + 24h)
    pub valid_until: DateTime<Utc>,
}

impl RewardToken {
    /// Issue a fresh token for display by the presenting client.
    pub fn issue(account: &UserAccount, now: DateTime<Utc>) -> Self {
        Self {
            user_id: account.user_id.clone(),
            user_name: Some(account.name.clone()),
            society: account.society.clone(),
            issued_at: now,
            valid_until: now + Duration::hours(TOKEN_VALIDITY_HOURS),
        }
    }

    /// Parse a decoded QR payload.
    ///
    /// Rejects non-JSON payloads and payloads without a `userId` as
    /// `MalformedToken`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let token: Self = serde_json::from_str(raw)
            .map_err(|e| AppError::MalformedToken(format!("not a valid token payload: {}", e)))?;

        if token.user_id.trim().is_empty() {
            return Err(AppError::MalformedToken("missing userId".to_string()));
        }

        Ok(token)
    }

    /// Encode for the QR presentation layer.
    pub fn to_payload(&self) -> Result<String, AppError> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("token encode failed: {}", e)))
    }
}

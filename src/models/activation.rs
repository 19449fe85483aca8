// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! QR activation state: the authoritative gate on token redemption.
//!
//! Exactly one state exists per user; a user with no stored state is
//! implicitly active. Reactivation is a read-time derivation from the
//! stored `reactivates_at`, never a timer, so it stays correct across
//! long process suspensions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user activation state, stored under `qrActivation/<userId>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrActivationState {
    /// False while inside the deactivation window
    pub active: bool,
    /// When the last successful scan deactivated the token
    pub deactivated_at: Option<DateTime<Utc>>,
    /// deactivated_at + 20h; redemption is rejected until this instant
    pub reactivates_at: Option<DateTime<Utc>>,
    /// Collector whose scan caused the deactivation
    pub deactivated_by: Option<String>,
    /// Points credited by that scan
    #[serde(default)]
    pub last_points_awarded: u64,
}

impl QrActivationState {
    /// Derive the effective status at `now`.
    ///
    /// A stored `active=false` flips back to active once `now` reaches
    /// `reactivates_at`; the stored record is left as-is.
    pub fn status_at(&self, now: DateTime<Utc>) -> ActivationStatus {
        if self.active {
            return ActivationStatus::active();
        }

        match self.reactivates_at {
            Some(reactivates_at) if now < reactivates_at => ActivationStatus {
                active: false,
                reactivates_at: Some(reactivates_at),
                remaining_secs: Some((reactivates_at - now).num_seconds()),
            },
            // Window elapsed (or state malformed with no reactivation
            // instant): treat as active.
            _ => ActivationStatus::active(),
        }
    }
}

/// Result of an activation check.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationStatus {
    pub active: bool,
    pub reactivates_at: Option<DateTime<Utc>>,
    pub remaining_secs: Option<i64>,
}

impl ActivationStatus {
    pub fn active() -> Self {
        Self {
            active: true,
            reactivates_at: None,
            remaining_secs: None,
        }
    }
}

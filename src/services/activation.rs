// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! QR activation manager: per-user redemption gate.
//!
//! A successful scan deactivates the user's token for a fixed 20-hour
//! window. The window deliberately replaces the old calendar-day marker:
//! a day boundary treats 23:59 and 00:01 as different days, while the
//! rolling window keeps "one reward per ~day" honest across midnight.

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::models::{ActivationStatus, QrActivationState};
use crate::store::{keys, KvStore};

/// How long a token stays deactivated after a successful scan.
pub const DEACTIVATION_WINDOW_HOURS: i64 = 20;

/// Activation checks and transitions over the shared store.
#[derive(Clone)]
pub struct ActivationService {
    store: KvStore,
}

impl ActivationService {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    /// Effective activation status right now. Never fails on a missing
    /// state: a user who has never been scanned is active.
    pub fn check_active(&self, user_id: &str) -> Result<ActivationStatus> {
        self.check_active_at(user_id, Utc::now())
    }

    /// Deterministic variant used by the award path and tests.
    ///
    /// Reactivation is derived here at read time; no background process
    /// flips the stored record back.
    pub fn check_active_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<ActivationStatus> {
        let status = match self
            .store
            .get::<QrActivationState>(&keys::qr_activation(user_id))?
        {
            Some(state) => state.status_at(now),
            None => ActivationStatus::active(),
        };
        Ok(status)
    }

    /// Deactivate a user's token for the full window.
    ///
    /// Idempotent in effect: re-deactivating simply resets the window.
    /// Called only after the credit for this scan has succeeded.
    pub fn deactivate(&self, user_id: &str, collector_id: &str, points_awarded: u64) -> Result<()> {
        self.deactivate_at(user_id, collector_id, points_awarded, Utc::now())
    }

    /// Deterministic variant used by the award path and tests.
    pub fn deactivate_at(
        &self,
        user_id: &str,
        collector_id: &str,
        points_awarded: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let reactivates_at = now + Duration::hours(DEACTIVATION_WINDOW_HOURS);
        let state = QrActivationState {
            active: false,
            deactivated_at: Some(now),
            reactivates_at: Some(reactivates_at),
            deactivated_by: Some(collector_id.to_string()),
            last_points_awarded: points_awarded,
        };

        self.store.put(&keys::qr_activation(user_id), &state)?;

        tracing::info!(
            user_id,
            collector_id,
            points_awarded,
            reactivates_at = %reactivates_at,
            "Token deactivated"
        );
        Ok(())
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan pipeline and activity ledger.
//!
//! The pipeline turns one decoded QR payload into at most one award:
//! 1. Parse the payload as a reward token
//! 2. Check the user's activation state
//! 3. Credit the fixed award amount
//! 4. Deactivate the token for the 20-hour window
//! 5. Append a scan record to the ledger
//!
//! Ordering matters in exactly one place: credit precedes deactivation,
//! so a crash between the two never leaves a user deactivated unpaid.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::bus::{Event, NotificationBus};
use crate::error::{AppError, Result};
use crate::models::{scan::dedup_for_display, ScanOutcome, ScanRecord, RewardToken};
use crate::services::{ActivationService, BalanceService};
use crate::store::{keys, KvStore};
use crate::time_utils::format_utc_rfc3339;

/// Most recent records kept per collector.
const SCAN_HISTORY_LIMIT: usize = 50;

/// Default visible window for activity feeds.
pub const DEFAULT_FEED_LIMIT: usize = 10;

/// Append-only history of awarded scans.
#[derive(Clone)]
pub struct ActivityLedger {
    store: KvStore,
    bus: NotificationBus,
    /// High-water mark for record IDs; two awards in the same millisecond
    /// must not collide.
    last_id: Arc<AtomicI64>,
}

impl ActivityLedger {
    pub fn new(store: KvStore, bus: NotificationBus) -> Self {
        Self {
            store,
            bus,
            last_id: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Next record ID: the current millisecond, bumped past any ID already
    /// handed out.
    fn next_record_id(&self, now: DateTime<Utc>) -> i64 {
        let millis = now.timestamp_millis();
        let prev = self
            .last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(millis.max(last + 1))
            })
            .unwrap_or(0);
        millis.max(prev + 1)
    }

    /// Append one awarded scan to the user's feed and the collector's
    /// bounded history, then publish `ActivityAdded`.
    pub fn append(
        &self,
        user_id: &str,
        user_name: &str,
        collector_id: &str,
        points_awarded: u64,
        now: DateTime<Utc>,
    ) -> Result<ScanRecord> {
        let record = ScanRecord {
            id: self.next_record_id(now),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            timestamp: now,
            points_awarded,
        };

        let appended = record.clone();
        self.store
            .update(&keys::activity(user_id), move |current: Option<Vec<ScanRecord>>| {
                let mut records = current.unwrap_or_default();
                records.push(appended);
                Ok(records)
            })?;

        let for_history = record.clone();
        self.store.update(
            &keys::scan_history(collector_id),
            move |current: Option<Vec<ScanRecord>>| {
                let mut records = current.unwrap_or_default();
                records.insert(0, for_history);
                records.truncate(SCAN_HISTORY_LIMIT);
                Ok(records)
            },
        )?;

        self.bus.publish(Event::ActivityAdded {
            record: record.clone(),
        });

        Ok(record)
    }

    /// De-duplicated descending feed for a user, capped at `limit`.
    pub fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<ScanRecord>> {
        let records = self
            .store
            .get::<Vec<ScanRecord>>(&keys::activity(user_id))?
            .unwrap_or_default();

        let mut deduped = dedup_for_display(records);
        deduped.truncate(limit);
        Ok(deduped)
    }

    /// Raw stored feed for a user (ledger order, undeduplicated).
    pub fn all_for_user(&self, user_id: &str) -> Result<Vec<ScanRecord>> {
        Ok(self
            .store
            .get::<Vec<ScanRecord>>(&keys::activity(user_id))?
            .unwrap_or_default())
    }

    /// A collector's recent scans, newest first.
    pub fn history_for_collector(&self, collector_id: &str) -> Result<Vec<ScanRecord>> {
        Ok(self
            .store
            .get::<Vec<ScanRecord>>(&keys::scan_history(collector_id))?
            .unwrap_or_default())
    }
}

/// Turns decoded QR payloads into awards.
#[derive(Clone)]
pub struct ScanPipeline {
    balance: BalanceService,
    activation: ActivationService,
    ledger: ActivityLedger,
    award_points: u64,
}

impl ScanPipeline {
    pub fn new(
        balance: BalanceService,
        activation: ActivationService,
        ledger: ActivityLedger,
        award_points: u64,
    ) -> Self {
        Self {
            balance,
            activation,
            ledger,
            award_points,
        }
    }

    /// Process one decoded payload into at most one award.
    pub fn process_scan(&self, raw_payload: &str, collector_id: &str) -> Result<ScanOutcome> {
        self.process_scan_at(raw_payload, collector_id, Utc::now())
    }

    /// Deterministic variant used by tests.
    pub fn process_scan_at(
        &self,
        raw_payload: &str,
        collector_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ScanOutcome> {
        // 1. Parse. No state has been touched on failure.
        let token = RewardToken::parse(raw_payload)?;
        let user_id = token.user_id.as_str();

        // 2. Activation gate. The token's own valid_until is cosmetic;
        //    only the stored activation state decides.
        let status = self.activation.check_active_at(user_id, now)?;
        if !status.active {
            let reactivates_at = status
                .reactivates_at
                .map(format_utc_rfc3339)
                .unwrap_or_default();
            tracing::info!(
                user_id,
                collector_id,
                reactivates_at = %reactivates_at,
                "Scan rejected: token deactivated"
            );
            return Err(AppError::TokenDeactivated {
                reactivates_at,
                remaining_secs: status.remaining_secs.unwrap_or(0),
            });
        }

        // 3./4. Credit the policy amount. A failure here aborts with no
        //    deactivation and no ledger entry.
        let new_balance = self.balance.credit(user_id, self.award_points)?;

        // 5. Deactivate after the credit has landed. If this fails the
        //    credit stands; paid-but-active is the recoverable direction.
        self.activation
            .deactivate_at(user_id, collector_id, self.award_points, now)
            .inspect_err(|e| {
                tracing::warn!(user_id, error = %e, "Credit succeeded but deactivation failed");
            })?;

        // 6. Record the award.
        let user_name = token.user_name.as_deref().unwrap_or("Unknown User");
        self.ledger
            .append(user_id, user_name, collector_id, self.award_points, now)?;

        tracing::info!(
            user_id,
            collector_id,
            points = self.award_points,
            new_balance,
            "Scan awarded"
        );

        // 7. Outcome for the collector view.
        Ok(ScanOutcome {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            points_awarded: self.award_points,
            new_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, UserAccount};

    fn pipeline() -> (ScanPipeline, BalanceService, ActivationService, ActivityLedger) {
        let store = KvStore::in_memory();
        let bus = NotificationBus::new();
        let balance = BalanceService::new(store.clone(), bus.clone());
        let activation = ActivationService::new(store.clone());
        let ledger = ActivityLedger::new(store, bus);
        let pipeline = ScanPipeline::new(
            balance.clone(),
            activation.clone(),
            ledger.clone(),
            3,
        );
        (pipeline, balance, activation, ledger)
    }

    fn payload(user_id: &str, name: &str) -> String {
        let account = UserAccount {
            user_id: user_id.to_string(),
            name: name.to_string(),
            society: Some("Green Valley Society".to_string()),
            email: None,
            role: Role::User,
            points: 0,
        };
        RewardToken::issue(&account, "2024-01-01T00:00:00Z".parse().unwrap())
            .to_payload()
            .unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_successful_scan_credits_and_deactivates() {
        let (pipeline, balance, activation, ledger) = pipeline();

        let outcome = pipeline
            .process_scan_at(&payload("U1", "John Doe"), "COL001", at("2024-01-01T00:00:00Z"))
            .unwrap();

        assert_eq!(outcome.points_awarded, 3);
        assert_eq!(outcome.new_balance, 3);
        assert_eq!(balance.read("U1").unwrap(), 3);

        let status = activation
            .check_active_at("U1", at("2024-01-01T00:00:01Z"))
            .unwrap();
        assert!(!status.active);
        assert_eq!(status.reactivates_at, Some(at("2024-01-01T20:00:00Z")));

        let feed = ledger.recent_for_user("U1", 10).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].points_awarded, 3);
    }

    #[test]
    fn test_scan_during_window_rejected_without_mutation() {
        let (pipeline, balance, _, ledger) = pipeline();
        let raw = payload("U1", "John Doe");

        pipeline
            .process_scan_at(&raw, "COL001", at("2024-01-01T00:00:00Z"))
            .unwrap();
        let err = pipeline
            .process_scan_at(&raw, "COL001", at("2024-01-01T10:00:00Z"))
            .unwrap_err();

        match err {
            AppError::TokenDeactivated { remaining_secs, .. } => {
                assert_eq!(remaining_secs, 10 * 3600);
            }
            other => panic!("expected TokenDeactivated, got {:?}", other),
        }
        assert_eq!(balance.read("U1").unwrap(), 3);
        assert_eq!(ledger.all_for_user("U1").unwrap().len(), 1);
    }

    #[test]
    fn test_end_to_end_window_scenario() {
        let (pipeline, balance, _, _) = pipeline();
        let raw = payload("U1", "John Doe");

        let first = pipeline
            .process_scan_at(&raw, "COL001", at("2024-01-01T00:00:00Z"))
            .unwrap();
        assert_eq!(first.new_balance, 3);

        assert!(pipeline
            .process_scan_at(&raw, "COL001", at("2024-01-01T10:00:00Z"))
            .is_err());
        assert_eq!(balance.read("U1").unwrap(), 3);

        let second = pipeline
            .process_scan_at(&raw, "COL001", at("2024-01-01T20:00:01Z"))
            .unwrap();
        assert_eq!(second.new_balance, 6);
    }

    #[test]
    fn test_malformed_payloads_touch_nothing() {
        let (pipeline, balance, activation, ledger) = pipeline();

        for raw in ["not json", r#"{"name":"x"}"#] {
            let err = pipeline
                .process_scan_at(raw, "COL001", at("2024-01-01T00:00:00Z"))
                .unwrap_err();
            assert!(matches!(err, AppError::MalformedToken(_)));
        }

        assert_eq!(balance.read("U1").unwrap(), 0);
        assert!(activation
            .check_active_at("U1", at("2024-01-01T00:00:01Z"))
            .unwrap()
            .active);
        assert!(ledger.all_for_user("U1").unwrap().is_empty());
    }

    #[test]
    fn test_award_ignores_token_expiry() {
        // valid_until is display metadata; redemption authority lives in
        // the activation state.
        let (pipeline, _, _, _) = pipeline();
        let raw = payload("U1", "John Doe"); // valid until 2024-01-02

        let outcome = pipeline
            .process_scan_at(&raw, "COL001", at("2024-03-01T00:00:00Z"))
            .unwrap();
        assert_eq!(outcome.new_balance, 3);
    }

    #[test]
    fn test_collector_history_is_bounded() {
        let (_, _, _, ledger) = pipeline();

        for i in 0..60 {
            let ts = at("2024-01-01T00:00:00Z") + chrono::Duration::minutes(i);
            ledger
                .append(&format!("U{}", i), "Someone", "COL001", 3, ts)
                .unwrap();
        }

        let history = ledger.history_for_collector("COL001").unwrap();
        assert_eq!(history.len(), 50);
        // Newest first.
        assert_eq!(history[0].user_id, "U59");
    }

    #[test]
    fn test_record_ids_strictly_increase_within_a_millisecond() {
        let (_, _, _, ledger) = pipeline();
        let ts = at("2024-01-01T00:00:00Z");

        let a = ledger.append("U1", "A", "COL001", 3, ts).unwrap();
        let b = ledger.append("U2", "B", "COL001", 3, ts).unwrap();
        assert!(b.id > a.id);
    }
}

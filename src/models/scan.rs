// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan records and the award outcome returned to collectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two records for the same user with equal points inside this window are
/// one award observed twice (the cross-tab signal can double-fire).
pub const DEDUP_WINDOW_SECS: i64 = 5;

/// Immutable record of one awarded scan.
///
/// Appended by the scan pipeline; never mutated or deleted. `id` is
/// millisecond-derived and strictly increasing within a process, which is
/// monotonic enough for display ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: i64,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
    pub points_awarded: u64,
}

/// Result of a successful scan, surfaced to the collector view.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub user_id: String,
    pub user_name: String,
    pub points_awarded: u64,
    pub new_balance: u64,
}

/// Prepare records for display: descending by timestamp, duplicates
/// collapsed.
///
/// Input order does not matter. A record is a duplicate of an already-kept
/// one when it has the same user, equal points, and a timestamp within
/// [`DEDUP_WINDOW_SECS`].
pub fn dedup_for_display(mut records: Vec<ScanRecord>) -> Vec<ScanRecord> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

    let mut kept: Vec<ScanRecord> = Vec::with_capacity(records.len());
    for record in records {
        let duplicate = kept.iter().any(|k| {
            k.user_id == record.user_id
                && k.points_awarded == record.points_awarded
                && (k.timestamp - record.timestamp).num_seconds().abs() <= DEDUP_WINDOW_SECS
        });
        if !duplicate {
            kept.push(record);
        }
    }
    kept
}

//! Persisted key-value layer shared by every view of a user's data.

pub mod kv;

pub use kv::{KvStore, StoreChange};

/// Key prefixes as constants.
pub mod keys {
    /// `user/<userId>` -> UserAccount
    pub const USER: &str = "user/";
    /// `qrActivation/<userId>` -> QrActivationState
    pub const QR_ACTIVATION: &str = "qrActivation/";
    /// `scanHistory/<collectorId>` -> bounded list of ScanRecord
    pub const SCAN_HISTORY: &str = "scanHistory/";
    /// `activity/<userId>` -> append-only list of ScanRecord
    pub const ACTIVITY: &str = "activity/";
    /// `dailyCollections/<YYYY-MM-DD>` -> legacy daily markers (purged)
    pub const DAILY_COLLECTIONS: &str = "dailyCollections/";

    pub fn user(user_id: &str) -> String {
        format!("{}{}", USER, user_id)
    }

    pub fn qr_activation(user_id: &str) -> String {
        format!("{}{}", QR_ACTIVATION, user_id)
    }

    pub fn scan_history(collector_id: &str) -> String {
        format!("{}{}", SCAN_HISTORY, collector_id)
    }

    pub fn activity(user_id: &str) -> String {
        format!("{}{}", ACTIVITY, user_id)
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Balance store: the single source of truth for point totals.

use crate::bus::{Event, NotificationBus};
use crate::error::{AppError, Result};
use crate::models::{Role, UserAccount};
use crate::store::{keys, KvStore};

/// Point balance operations over the shared store.
#[derive(Clone)]
pub struct BalanceService {
    store: KvStore,
    bus: NotificationBus,
}

impl BalanceService {
    pub fn new(store: KvStore, bus: NotificationBus) -> Self {
        Self { store, bus }
    }

    /// Credit `delta` points to a user and return the new balance.
    ///
    /// The read-modify-write is serialized by the store, so concurrent
    /// credits of the same user both land. The `BalanceChanged` event is
    /// published before this returns; no caller can observe a credited
    /// balance whose in-process subscribers have not been notified.
    pub fn credit(&self, user_id: &str, delta: u64) -> Result<u64> {
        if delta == 0 {
            return Err(AppError::InvalidAmount);
        }

        let account = self.store.update(&keys::user(user_id), |current| {
            let mut account = current.unwrap_or_else(|| placeholder_account(user_id));
            account.points += delta;
            Ok(account)
        })?;

        tracing::info!(
            user_id,
            delta,
            points = account.points,
            "Balance credited"
        );

        self.bus.publish(Event::BalanceChanged {
            user_id: user_id.to_string(),
            points: account.points,
            delta: Some(delta),
        });

        Ok(account.points)
    }

    /// Current balance; 0 for an unknown user.
    pub fn read(&self, user_id: &str) -> Result<u64> {
        Ok(self
            .store
            .get::<UserAccount>(&keys::user(user_id))?
            .map(|account| account.points)
            .unwrap_or(0))
    }

    /// Administrative overwrite of the whole account.
    ///
    /// Used only by session bootstrap/restore, never by the award path.
    pub fn set(&self, account: &UserAccount) -> Result<()> {
        self.store.put(&keys::user(&account.user_id), account)?;
        tracing::info!(
            user_id = %account.user_id,
            points = account.points,
            "Account set"
        );
        Ok(())
    }

    /// Full account lookup.
    pub fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>> {
        self.store.get(&keys::user(user_id))
    }
}

/// Account shell created when a collector scans a user whose account was
/// bootstrapped in another context. Profile fields arrive with the user's
/// own session.
fn placeholder_account(user_id: &str) -> UserAccount {
    UserAccount {
        user_id: user_id.to_string(),
        name: String::new(),
        society: None,
        email: None,
        role: Role::User,
        points: 0,
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notification bus: fans balance/activity changes out to every view.
//!
//! Two transport layers:
//! - a synchronous local subscriber list, invoked inside `publish` so the
//!   originating context self-notifies before the mutating call returns;
//! - an async broadcast feed consumed by other execution contexts (the
//!   SSE route, and the bridge from the store's change feed).
//!
//! The same logical change can arrive on both layers; consumers tolerate
//! duplicate delivery (the activity ledger de-duplicates for display, and
//! balance events carry the absolute balance).

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{ScanRecord, UserAccount};
use crate::store::{keys, KvStore};

const FEED_CAPACITY: usize = 256;

/// A state change every interested view must observe.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    BalanceChanged {
        user_id: String,
        /// Absolute balance after the change
        points: u64,
        /// Credited amount; None when observed via the store change feed
        delta: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    ActivityAdded { record: ScanRecord },
}

impl Event {
    /// Event kind, used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::BalanceChanged { .. } => "balanceChanged",
            Event::ActivityAdded { .. } => "activityAdded",
        }
    }

    /// The user whose views this event concerns.
    pub fn user_id(&self) -> &str {
        match self {
            Event::BalanceChanged { user_id, .. } => user_id,
            Event::ActivityAdded { record } => &record.user_id,
        }
    }
}

type LocalSubscriber = Box<dyn Fn(&Event) + Send + Sync>;

struct BusInner {
    local: Mutex<Vec<LocalSubscriber>>,
    feed: broadcast::Sender<Event>,
}

/// Process-wide publish/subscribe channel.
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(BusInner {
                local: Mutex::new(Vec::new()),
                feed,
            }),
        }
    }

    /// Register an in-process subscriber, notified synchronously inside
    /// `publish`.
    pub fn subscribe_local<F>(&self, f: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        if let Ok(mut local) = self.inner.local.lock() {
            local.push(Box::new(f));
        }
    }

    /// Subscribe to the async feed.
    pub fn watch(&self) -> broadcast::Receiver<Event> {
        self.inner.feed.subscribe()
    }

    /// Publish on both layers. Local subscribers run before this returns.
    pub fn publish(&self, event: Event) {
        tracing::debug!(kind = event.kind(), "Publishing event");

        if let Ok(local) = self.inner.local.lock() {
            for subscriber in local.iter() {
                subscriber(&event);
            }
        }

        // No feed receivers is fine.
        let _ = self.inner.feed.send(event);
    }

    /// Bridge the store's change feed onto the bus.
    ///
    /// Other execution contexts signal through the shared store; this task
    /// turns a changed `user/<id>` key into a `BalanceChanged` event so
    /// views converge without polling.
    pub fn bridge_store(&self, store: KvStore) {
        let bus = self.clone();
        let mut changes = store.watch();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let Some(user_id) = change.key.strip_prefix(keys::USER) else {
                            continue;
                        };
                        match store.get::<UserAccount>(&change.key) {
                            Ok(Some(account)) => bus.publish(Event::BalanceChanged {
                                user_id: user_id.to_string(),
                                points: account.points,
                                delta: None,
                            }),
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, key = %change.key, "Bridge read failed");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Store change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

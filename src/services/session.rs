// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scan session: drives the camera decode loop for a collector.
//!
//! The camera/decoder collaborator is the one long-lived suspending
//! operation in the system. The session consumes decoded payloads one at
//! a time, feeds them to the pipeline, and guarantees the camera resource
//! is released exactly once on every exit path: award, error, or
//! cancellation. A decode that completes after cancellation is ignored
//! (the armed flag is checked before processing).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::{AppError, Result};
use crate::models::ScanOutcome;
use crate::services::ScanPipeline;

/// Camera/decoder collaborator: a stream of decoded text payloads.
#[allow(async_fn_in_trait)]
pub trait PayloadSource {
    /// Await the next decoded payload. `Ok(None)` means the source is
    /// exhausted (user closed the scanner view).
    async fn next_decoded(&mut self) -> Result<Option<String>>;

    /// Release the underlying camera resource. Called exactly once by the
    /// session.
    fn release(&mut self);
}

/// Handle for stopping a running session from outside.
#[derive(Clone)]
pub struct SessionHandle {
    armed: Arc<AtomicBool>,
    cancel: Arc<Notify>,
}

impl SessionHandle {
    /// Cancel the scan loop. Disarms first so an in-flight decode that
    /// lands after this call cannot trigger an award.
    pub fn stop(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.cancel.notify_waiters();
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// One collector's scan loop over a payload source.
pub struct ScanSession<S: PayloadSource> {
    pipeline: ScanPipeline,
    source: Option<S>,
    collector_id: String,
    armed: Arc<AtomicBool>,
    cancel: Arc<Notify>,
}

impl<S: PayloadSource> ScanSession<S> {
    pub fn new(pipeline: ScanPipeline, source: S, collector_id: &str) -> Self {
        Self {
            pipeline,
            source: Some(source),
            collector_id: collector_id.to_string(),
            armed: Arc::new(AtomicBool::new(true)),
            cancel: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            armed: self.armed.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Run the loop until an award, a fatal error, cancellation, or source
    /// exhaustion. Rejected payloads (malformed, cooldown) are reported
    /// through `on_reject` and scanning continues.
    ///
    /// Returns `Ok(None)` when the loop ends without an award.
    pub async fn run<F>(mut self, mut on_reject: F) -> Result<Option<ScanOutcome>>
    where
        F: FnMut(AppError),
    {
        let result = self.scan_loop(&mut on_reject).await;
        self.release();
        result
    }

    async fn scan_loop<F>(&mut self, on_reject: &mut F) -> Result<Option<ScanOutcome>>
    where
        F: FnMut(AppError),
    {
        let cancel = self.cancel.clone();
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        loop {
            if !self.armed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            let next = tokio::select! {
                _ = cancel.notified() => return Ok(None),
                next = source.next_decoded() => next,
            };

            let Some(payload) = next? else {
                return Ok(None);
            };

            // Late decode: the decoder may hand over a result that was
            // in flight when stop() ran.
            if !self.armed.load(Ordering::SeqCst) {
                tracing::debug!(collector_id = %self.collector_id, "Ignoring decode after cancel");
                return Ok(None);
            }

            match self.pipeline.process_scan(&payload, &self.collector_id) {
                Ok(outcome) => {
                    self.armed.store(false, Ordering::SeqCst);
                    return Ok(Some(outcome));
                }
                Err(e) if e.is_scan_rejection() => {
                    tracing::info!(collector_id = %self.collector_id, error = %e, "Scan rejected");
                    on_reject(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            tracing::debug!(collector_id = %self.collector_id, "Camera source released");
        }
    }
}

impl<S: PayloadSource> Drop for ScanSession<S> {
    fn drop(&mut self) {
        // Covers early drops; release() is a no-op once the source is gone.
        self.release();
    }
}

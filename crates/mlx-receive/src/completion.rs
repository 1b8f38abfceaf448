// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-module completion signaling, used to build each module's wait-set
//! before any receive job is spawned.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A one-shot "this module has been received" signal.
///
/// Unlike [`crate::cancel::CancellationToken`] a `Completion` is owned by
/// a single module and signaled at most once; dependents hold a clone of
/// the same `Arc` to await it.
pub struct Completion {
    done: AtomicBool,
    notify: Notify,
}

impl Completion {
    /// Create a new, unsignaled completion.
    #[must_use]
    pub fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Mark this module as received. Idempotent.
    pub fn signal(&self) {
        self.done.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns `true` once [`signal`](Self::signal) has been called.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Wait until this module has been received.
    pub async fn wait(&self) {
        if self.is_done() {
            return;
        }
        loop {
            self.notify.notified().await;
            if self.is_done() {
                return;
            }
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

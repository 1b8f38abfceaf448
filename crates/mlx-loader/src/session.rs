// SPDX-License-Identifier: MIT OR Apache-2.0
//! A [`Session`]: the per-load target that receives a manifest's modules.

use async_trait::async_trait;
use mlx_core::{Manifest, Sha256Hex};
use mlx_receive::Receiver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Holds every module delivered by a completed load, keyed by module id.
///
/// A `Session` is the `Receiver` the façade hands to the receive engine;
/// after a successful [`crate::facade::LoaderFacade::load_or_fail`] it is
/// returned to the caller so the application's entry point can be looked
/// up via [`Session::main_module`].
pub struct Session {
    manifest: Manifest,
    modules: Mutex<HashMap<String, Vec<u8>>>,
    closed: AtomicBool,
}

impl Session {
    /// Create an empty session bound to `manifest`'s shape (no modules
    /// have been received yet).
    #[must_use]
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            modules: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The manifest this session was loaded from.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// A received module's bytes, if delivery has completed.
    pub async fn module_bytes(&self, id: &str) -> Option<Vec<u8>> {
        self.modules.lock().await.get(id).cloned()
    }

    /// The bytes of `manifest.main_module_id`, once received.
    pub async fn main_module_bytes(&self) -> Option<Vec<u8>> {
        self.module_bytes(&self.manifest.main_module_id).await
    }

    /// Mark this session closed. Closing only flips a flag for callers
    /// that check [`Session::is_closed`]; it does not release any
    /// resources (sessions hold module bytes in memory, not handles).
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if [`Session::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Receiver for Session {
    async fn receive(&self, id: &str, _sha256: Sha256Hex, bytes: Vec<u8>) -> Result<(), String> {
        self.modules.lock().await.insert(id.to_string(), bytes);
        Ok(())
    }
}

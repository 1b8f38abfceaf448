// SPDX-License-Identifier: MIT OR Apache-2.0
//! The [`Receiver`] trait: the single-threaded sink every module's
//! verified bytes are ultimately handed to.

use async_trait::async_trait;
use mlx_core::Sha256Hex;

/// Accepts one module's verified bytes at a time.
///
/// Implementations are invoked serially, always from the same task, so a
/// receiver backed by a non-thread-safe runtime (a script engine, a
/// single-threaded VM) never needs its own locking. Errors are plain
/// strings; the engine wraps them into [`mlx_core::LoaderError::ReceiverFailed`].
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Deliver `bytes` for module `id`, whose content hash is `sha256`
    /// (already verified by the caller).
    async fn receive(&self, id: &str, sha256: Sha256Hex, bytes: Vec<u8>) -> Result<(), String>;
}

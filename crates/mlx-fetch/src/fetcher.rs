// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Fetcher` trait and its three implementations.

use async_trait::async_trait;
use mlx_core::{LoaderError, Manifest, Sha256Hex};
use tokio::sync::Semaphore;

/// A source that can (maybe) produce a module's bytes or a manifest's
/// bytes, and maybe participates in pin lifecycle.
///
/// Returns `Ok(None)` for "I don't have this" (a miss, not a failure) so
/// a [`crate::chain::FetcherChain`] can fall through to the next source.
/// Returns `Err` only for an actual failure (a transport error, a
/// checksum mismatch, a parse failure).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a module's bytes. `semaphore` bounds concurrent network
    /// calls across the whole receive engine, not just this fetcher.
    async fn fetch(
        &self,
        semaphore: &Semaphore,
        application_name: &str,
        id: &str,
        sha256: Sha256Hex,
        url: &str,
    ) -> Result<Option<Vec<u8>>, LoaderError>;

    /// Fetch a manifest's raw bytes and parsed form. `url` is `None` when
    /// the caller has no network location for the manifest (see
    /// [`crate::chain::FetcherChain::fetch_manifest`]'s reversed,
    /// local-only fallback path).
    async fn fetch_manifest(
        &self,
        semaphore: &Semaphore,
        application_name: &str,
        url: Option<&str>,
    ) -> Result<Option<(Vec<u8>, Manifest)>, LoaderError>;

    /// Record that `application_name` is now using `manifest`. Only the
    /// cache-backed fetcher implements this meaningfully; others no-op.
    async fn pin(&self, application_name: &str, manifest: &Manifest) -> Result<(), LoaderError> {
        let _ = (application_name, manifest);
        Ok(())
    }

    /// Release the pin recorded by [`Fetcher::pin`]. Others no-op.
    async fn unpin(&self, application_name: &str, manifest: &Manifest) -> Result<(), LoaderError> {
        let _ = (application_name, manifest);
        Ok(())
    }
}

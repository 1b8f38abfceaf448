// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composes an ordered list of [`Fetcher`]s into a single one, consulted
//! forward for modules and in reverse for manifests.

use crate::fetcher::Fetcher;
use async_trait::async_trait;
use mlx_core::{LoaderError, Manifest, Sha256Hex};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// An ordered fetcher chain.
///
/// Modules are fast-local-first: the chain is walked in the order given
/// (embedded, then cache-or-http), since a matching hash guarantees
/// equivalence no matter the source. Manifests are network-first: the
/// chain is walked in reverse, so a live network fetch wins over a
/// cached or embedded one, and only falls back to local sources when
/// the network is unreachable or no URL is known at all.
#[derive(Clone)]
pub struct FetcherChain {
    fetchers: Vec<Arc<dyn Fetcher>>,
}

impl FetcherChain {
    /// Build a chain from `fetchers`, in module-fetch order.
    #[must_use]
    pub fn new(fetchers: Vec<Arc<dyn Fetcher>>) -> Self {
        Self { fetchers }
    }

    /// Try each fetcher in order until one returns a hit.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::FetchFailed`] if every fetcher misses, or
    /// propagates the first hard error encountered.
    pub async fn fetch(
        &self,
        semaphore: &Semaphore,
        application_name: &str,
        id: &str,
        sha256: Sha256Hex,
        url: &str,
    ) -> Result<Vec<u8>, LoaderError> {
        for fetcher in &self.fetchers {
            if let Some(bytes) = fetcher
                .fetch(semaphore, application_name, id, sha256, url)
                .await?
            {
                return Ok(bytes);
            }
        }
        Err(LoaderError::FetchFailed {
            url: Some(url.to_string()),
            detail: format!("no fetcher in the chain satisfied module {id}"),
        })
    }

    /// Try each fetcher in reverse order until one returns a hit.
    ///
    /// `url` is the manifest's network location, or `None` when the
    /// caller has no URL to offer (the null-manifest-URL case) — in that
    /// case network fetchers in the chain report a miss themselves and
    /// only local sources can satisfy the request.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::FetchFailed`] if every fetcher misses.
    pub async fn fetch_manifest(
        &self,
        semaphore: &Semaphore,
        application_name: &str,
        url: Option<&str>,
    ) -> Result<(Vec<u8>, Manifest), LoaderError> {
        for fetcher in self.fetchers.iter().rev() {
            if let Some(result) = fetcher.fetch_manifest(semaphore, application_name, url).await? {
                return Ok(result);
            }
        }
        Err(LoaderError::FetchFailed {
            url: url.map(str::to_string),
            detail: "no fetcher in the chain produced a manifest".into(),
        })
    }

    /// Pin `manifest` across every fetcher that tracks pins.
    pub async fn pin(&self, application_name: &str, manifest: &Manifest) -> Result<(), LoaderError> {
        for fetcher in &self.fetchers {
            fetcher.pin(application_name, manifest).await?;
        }
        Ok(())
    }

    /// Unpin `manifest` across every fetcher that tracks pins.
    pub async fn unpin(&self, application_name: &str, manifest: &Manifest) -> Result<(), LoaderError> {
        for fetcher in &self.fetchers {
            fetcher.unpin(application_name, manifest).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for FetcherChain {
    async fn fetch(
        &self,
        semaphore: &Semaphore,
        application_name: &str,
        id: &str,
        sha256: Sha256Hex,
        url: &str,
    ) -> Result<Option<Vec<u8>>, LoaderError> {
        FetcherChain::fetch(self, semaphore, application_name, id, sha256, url)
            .await
            .map(Some)
    }

    async fn fetch_manifest(
        &self,
        semaphore: &Semaphore,
        application_name: &str,
        url: Option<&str>,
    ) -> Result<Option<(Vec<u8>, Manifest)>, LoaderError> {
        FetcherChain::fetch_manifest(self, semaphore, application_name, url)
            .await
            .map(Some)
    }

    async fn pin(&self, application_name: &str, manifest: &Manifest) -> Result<(), LoaderError> {
        FetcherChain::pin(self, application_name, manifest).await
    }

    async fn unpin(&self, application_name: &str, manifest: &Manifest) -> Result<(), LoaderError> {
        FetcherChain::unpin(self, application_name, manifest).await
    }
}

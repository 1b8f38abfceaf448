// SPDX-License-Identifier: MIT OR Apache-2.0
//! The HTTP fetcher: acquires the concurrency semaphore, delegates to an
//! injected [`HttpClient`].

use crate::client::HttpClient;
use crate::fetcher::Fetcher;
use async_trait::async_trait;
use mlx_core::{LoaderError, Manifest, Sha256Hex};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Fetches bytes over the network. Never returns a miss for modules (a
/// `url` is always present); returns a miss for a manifest request with
/// no URL rather than failing, so the chain can fall through to a local
/// source.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Arc<dyn HttpClient>,
}

impl HttpFetcher {
    /// Build a fetcher backed by `client`.
    #[must_use]
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    async fn acquire<'a>(
        &self,
        semaphore: &'a Semaphore,
    ) -> Result<tokio::sync::SemaphorePermit<'a>, LoaderError> {
        semaphore.acquire().await.map_err(|_| LoaderError::ChannelClosed)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        semaphore: &Semaphore,
        _application_name: &str,
        id: &str,
        _sha256: Sha256Hex,
        url: &str,
    ) -> Result<Option<Vec<u8>>, LoaderError> {
        let _permit = self.acquire(semaphore).await?;
        debug!(target: "mlx.fetch.http", id, url, "fetching module");
        let bytes = self.client.get_bytes(url).await.inspect_err(|err| {
            warn!(target: "mlx.fetch.http", id, url, error = %err, "module fetch failed");
        })?;
        Ok(Some(bytes))
    }

    async fn fetch_manifest(
        &self,
        semaphore: &Semaphore,
        _application_name: &str,
        url: Option<&str>,
    ) -> Result<Option<(Vec<u8>, Manifest)>, LoaderError> {
        let Some(url) = url else {
            return Ok(None);
        };
        let _permit = self.acquire(semaphore).await?;
        debug!(target: "mlx.fetch.http", url, "fetching manifest");
        let bytes = self.client.get_bytes(url).await.inspect_err(|err| {
            warn!(target: "mlx.fetch.http", url, error = %err, "manifest fetch failed");
        })?;
        let manifest = Manifest::parse(&bytes)
            .map_err(|e| LoaderError::ManifestParseFailed { detail: e.to_string() })?;
        Ok(Some((bytes, manifest)))
    }
}

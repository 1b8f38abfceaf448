// SPDX-License-Identifier: MIT OR Apache-2.0
//! The embedded fetcher: a read-only directory bundled alongside the
//! application, never written to.

use crate::fetcher::Fetcher;
use async_trait::async_trait;
use mlx_core::{LoaderError, Manifest, Sha256Hex};
use std::path::PathBuf;
use tokio::sync::Semaphore;

/// Reads module bytes by the hex of their expected hash, and a single
/// bundled manifest, from a read-only directory pair.
///
/// Module lookup never consults `url` or `id` — only the hash, so an
/// embedded bundle is valid regardless of what URL a manifest names.
#[derive(Debug, Clone)]
pub struct EmbeddedFetcher {
    modules_dir: PathBuf,
    manifest_path: Option<PathBuf>,
}

impl EmbeddedFetcher {
    /// Create a fetcher over `modules_dir`, with no bundled manifest.
    #[must_use]
    pub fn new(modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            modules_dir: modules_dir.into(),
            manifest_path: None,
        }
    }

    /// Attach a bundled manifest file, returned regardless of the
    /// requested manifest URL.
    #[must_use]
    pub fn with_manifest(mut self, manifest_path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(manifest_path.into());
        self
    }
}

async fn read_optional(path: &std::path::Path) -> Result<Option<Vec<u8>>, LoaderError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LoaderError::Io(e)),
    }
}

#[async_trait]
impl Fetcher for EmbeddedFetcher {
    async fn fetch(
        &self,
        _semaphore: &Semaphore,
        _application_name: &str,
        _id: &str,
        sha256: Sha256Hex,
        _url: &str,
    ) -> Result<Option<Vec<u8>>, LoaderError> {
        read_optional(&self.modules_dir.join(sha256.to_hex())).await
    }

    async fn fetch_manifest(
        &self,
        _semaphore: &Semaphore,
        _application_name: &str,
        _url: Option<&str>,
    ) -> Result<Option<(Vec<u8>, Manifest)>, LoaderError> {
        let Some(path) = &self.manifest_path else {
            return Ok(None);
        };
        let Some(bytes) = read_optional(path).await? else {
            return Ok(None);
        };
        let manifest = Manifest::parse(&bytes)
            .map_err(|e| LoaderError::ManifestParseFailed { detail: e.to_string() })?;
        Ok(Some((bytes, manifest)))
    }
}

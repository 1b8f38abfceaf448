// SPDX-License-Identifier: MIT OR Apache-2.0
//! The cache-wrapping fetcher: composes over another fetcher, serving
//! from the content-addressed cache on a hit and populating it on a
//! miss. The only fetcher that implements [`Fetcher::pin`] /
//! [`Fetcher::unpin`] meaningfully.

use crate::fetcher::Fetcher;
use async_trait::async_trait;
use mlx_cache::FileCache;
use mlx_core::{LoaderError, Manifest, Sha256Hex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Wraps `inner` (typically [`crate::http::HttpFetcher`]) with
/// [`FileCache::get_or_put`] coalescing and eviction.
///
/// Manifests are not content-addressed the way modules are — a
/// manifest's hash is not known before it is fetched — so this fetcher
/// keeps a small in-memory map of the last hash it saw per application,
/// letting a later `fetch_manifest(None)` (no network URL available)
/// serve the last-known-good manifest straight from the cache.
pub struct CacheWrappingFetcher {
    inner: Arc<dyn Fetcher>,
    cache: Arc<FileCache>,
    last_manifest_hash: Mutex<HashMap<String, Sha256Hex>>,
}

impl CacheWrappingFetcher {
    /// Wrap `inner` with `cache`.
    #[must_use]
    pub fn new(inner: Arc<dyn Fetcher>, cache: Arc<FileCache>) -> Self {
        Self {
            inner,
            cache,
            last_manifest_hash: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Fetcher for CacheWrappingFetcher {
    async fn fetch(
        &self,
        semaphore: &Semaphore,
        application_name: &str,
        id: &str,
        sha256: Sha256Hex,
        url: &str,
    ) -> Result<Option<Vec<u8>>, LoaderError> {
        let application_name = application_name.to_string();
        let id = id.to_string();
        let url = url.to_string();
        let inner = self.inner.clone();

        // `get_or_put`'s producer has no fallible "miss" outcome of its
        // own, so a `None` from the inner fetcher surfaces as a
        // `FetchFailed` — by the time we're inside the cache-wrapping
        // fetcher, nothing downstream of it can serve the bytes.
        let bytes = self
            .cache
            .get_or_put(sha256, move || async move {
                match inner.fetch(semaphore, &application_name, &id, sha256, &url).await {
                    Ok(Some(bytes)) => Ok(bytes),
                    Ok(None) => {
                        tracing::debug!(target: "mlx.fetch.cache", id, url, "inner fetcher missed");
                        Err(LoaderError::FetchFailed {
                            url: Some(url.clone()),
                            detail: "inner fetcher reported a miss".into(),
                        })
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(Some(bytes))
    }

    async fn fetch_manifest(
        &self,
        semaphore: &Semaphore,
        application_name: &str,
        url: Option<&str>,
    ) -> Result<Option<(Vec<u8>, Manifest)>, LoaderError> {
        match url {
            Some(url) => {
                let Some((bytes, manifest)) =
                    self.inner.fetch_manifest(semaphore, application_name, Some(url)).await?
                else {
                    return Ok(None);
                };
                let hash = Sha256Hex::of(&bytes);
                let stored_bytes = bytes.clone();
                self.cache
                    .get_or_put(hash, move || async move { Ok(stored_bytes) })
                    .await?;
                self.last_manifest_hash
                    .lock()
                    .await
                    .insert(application_name.to_string(), hash);
                Ok(Some((bytes, manifest)))
            }
            None => {
                let hash = {
                    let map = self.last_manifest_hash.lock().await;
                    map.get(application_name).copied()
                };
                let Some(hash) = hash else {
                    return Ok(None);
                };
                let Some(bytes) = self.cache.get_if_ready(hash).await? else {
                    return Ok(None);
                };
                let manifest = Manifest::parse(&bytes)
                    .map_err(|e| LoaderError::ManifestParseFailed { detail: e.to_string() })?;
                Ok(Some((bytes, manifest)))
            }
        }
    }

    async fn pin(&self, application_name: &str, manifest: &Manifest) -> Result<(), LoaderError> {
        let manifest_json = manifest
            .to_pretty_json()
            .map_err(LoaderError::Serialization)?;
        let manifest_hash = Sha256Hex::of(manifest_json.as_bytes()).to_hex();
        let file_hashes: Vec<Sha256Hex> = manifest.modules.values().map(|m| m.sha256).collect();
        self.cache.pin(application_name, &manifest_hash, &file_hashes).await
    }

    async fn unpin(&self, application_name: &str, manifest: &Manifest) -> Result<(), LoaderError> {
        let manifest_json = manifest
            .to_pretty_json()
            .map_err(LoaderError::Serialization)?;
        let manifest_hash = Sha256Hex::of(manifest_json.as_bytes()).to_hex();
        self.cache.unpin(application_name, &manifest_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mlx_core::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OnceFetcher {
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for OnceFetcher {
        async fn fetch(
            &self,
            _semaphore: &Semaphore,
            _application_name: &str,
            _id: &str,
            _sha256: Sha256Hex,
            _url: &str,
        ) -> Result<Option<Vec<u8>>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.body.clone()))
        }

        async fn fetch_manifest(
            &self,
            _semaphore: &Semaphore,
            _application_name: &str,
            url: Option<&str>,
        ) -> Result<Option<(Vec<u8>, Manifest)>, LoaderError> {
            let Some(_url) = url else { return Ok(None) };
            self.calls.fetch_add(1, Ordering::SeqCst);
            let json = br#"{"modules":{},"mainModuleId":"a","mainFunction":"main","signatures":{}}"#;
            let manifest = Manifest::parse(json).unwrap();
            Ok(Some((json.to_vec(), manifest)))
        }
    }

    #[tokio::test]
    async fn second_fetch_serves_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            FileCache::open(dir.path(), &CacheConfig { max_size_bytes: 4096 })
                .await
                .unwrap(),
        );
        let bytes = b"module bytes".to_vec();
        let hash = Sha256Hex::of(&bytes);
        let inner = Arc::new(OnceFetcher {
            body: bytes.clone(),
            calls: AtomicUsize::new(0),
        });
        let fetcher = CacheWrappingFetcher::new(inner.clone(), cache);
        let semaphore = Semaphore::new(1);

        fetcher.fetch(&semaphore, "app", "id", hash, "http://x").await.unwrap();
        fetcher.fetch(&semaphore, "app", "id", hash, "http://x").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn manifest_served_locally_after_network_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            FileCache::open(dir.path(), &CacheConfig { max_size_bytes: 4096 })
                .await
                .unwrap(),
        );
        let inner = Arc::new(OnceFetcher {
            body: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let fetcher = CacheWrappingFetcher::new(inner, cache);
        let semaphore = Semaphore::new(1);

        let (_, manifest) = fetcher
            .fetch_manifest(&semaphore, "app", Some("http://x/manifest.json"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manifest.main_module_id, "a");

        let (_, manifest) = fetcher
            .fetch_manifest(&semaphore, "app", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manifest.main_module_id, "a");
    }

    #[tokio::test]
    async fn manifest_local_fallback_misses_for_unknown_app() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(
            FileCache::open(dir.path(), &CacheConfig { max_size_bytes: 4096 })
                .await
                .unwrap(),
        );
        let inner = Arc::new(OnceFetcher {
            body: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let fetcher = CacheWrappingFetcher::new(inner, cache);
        let semaphore = Semaphore::new(1);

        let result = fetcher.fetch_manifest(&semaphore, "never-seen", None).await.unwrap();
        assert!(result.is_none());
    }
}

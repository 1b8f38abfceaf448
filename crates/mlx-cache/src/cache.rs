// SPDX-License-Identifier: MIT OR Apache-2.0
//! The async-facing content-addressed file cache.
//!
//! Wraps [`crate::index::CacheIndex`] (driven from `tokio::task::spawn_blocking`,
//! since `rusqlite` has no async story of its own) with the filesystem
//! operations, LRU eviction, and per-hash `getOrPut` coalescing.

use crate::index::{CacheIndex, EntryState};
use mlx_core::{CacheConfig, LoaderError, Sha256Hex};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

fn join_err(e: tokio::task::JoinError) -> LoaderError {
    LoaderError::TaskJoin(e.to_string())
}

struct InFlight {
    notify: Notify,
    result: StdMutex<Option<Result<Vec<u8>, String>>>,
}

/// Reported to operators: how much of the cache's capacity is consumed by
/// pinned versus evictable entries.
#[derive(Debug, Clone, Copy)]
pub struct SpaceInUse {
    /// Bytes occupied by `READY` entries with at least one pin.
    pub pinned_bytes: u64,
    /// Bytes occupied by `READY` entries eligible for eviction.
    pub unpinned_bytes: u64,
    /// The configured capacity unpinned entries are held to.
    pub capacity_bytes: u64,
}

/// Content-addressed file cache: bytes on disk under their hex hash, an
/// index tracking lifecycle state and pins, and LRU eviction under size
/// pressure.
pub struct FileCache {
    root: PathBuf,
    index: Arc<Mutex<CacheIndex>>,
    capacity: u64,
    in_flight: Mutex<HashMap<String, Arc<InFlight>>>,
}

impl FileCache {
    /// Open (creating if absent) a cache rooted at `root`, with the given
    /// capacity configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be created or the index database
    /// cannot be opened.
    pub async fn open(root: impl Into<PathBuf>, config: &CacheConfig) -> Result<Self, LoaderError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let index_path = root.join("index.sqlite3");
        let index = tokio::task::spawn_blocking(move || CacheIndex::open(&index_path))
            .await
            .map_err(join_err)??;
        let cache = Self {
            root,
            index: Arc::new(Mutex::new(index)),
            capacity: config.max_size_bytes,
            in_flight: Mutex::new(HashMap::new()),
        };
        cache.prune().await?;
        Ok(cache)
    }

    /// Reconcile the index against the filesystem and run eviction.
    ///
    /// Run once at startup (from [`FileCache::open`]): any row still in
    /// `DirtyDownload` state belongs to a write that was in progress when
    /// the previous process stopped running. There is no live producer
    /// left to finish it, so its backing `.dirty` file, whether present
    /// or not, is an abandoned partial write. Both the file and the row
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read or written.
    pub async fn prune(&self) -> Result<(), LoaderError> {
        let index = self.index.clone();
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> Result<(), LoaderError> {
            let index = index.blocking_lock();
            for hash in index.dirty_download_hashes()? {
                let _ = std::fs::remove_file(root.join(format!("{hash}.dirty")));
                index.delete(&hash)?;
            }
            Ok(())
        })
        .await
        .map_err(join_err)??;
        self.evict_to_capacity().await
    }

    fn dirty_path(&self, hex: &str) -> PathBuf {
        self.root.join(format!("{hex}.dirty"))
    }

    fn blob_path(&self, hex: &str) -> PathBuf {
        self.root.join(hex)
    }

    /// Atomically return cached bytes for `hash` if already `READY`;
    /// otherwise run `producer`, verify its output hashes to `hash`, store
    /// it, run eviction, and return it.
    ///
    /// Concurrent calls for the same `hash` coalesce: only the first
    /// caller runs `producer`; the rest observe its result (success or
    /// failure) without invoking `producer` themselves.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::ChecksumMismatch`] if `producer`'s bytes do
    /// not hash to `hash`, or whatever error `producer` itself returned.
    pub async fn get_or_put<F, Fut>(
        &self,
        hash: Sha256Hex,
        producer: F,
    ) -> Result<Vec<u8>, LoaderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, LoaderError>>,
    {
        let hex = hash.to_hex();

        if let Some(bytes) = self.try_read_ready(&hex).await? {
            return Ok(bytes);
        }

        let (is_owner, in_flight) = {
            let mut map = self.in_flight.lock().await;
            if let Some(existing) = map.get(&hex) {
                (false, existing.clone())
            } else {
                let entry = Arc::new(InFlight {
                    notify: Notify::new(),
                    result: StdMutex::new(None),
                });
                map.insert(hex.clone(), entry.clone());
                (true, entry)
            }
        };

        if !is_owner {
            tracing::debug!(target: "mlx.cache", hash = %hex, "coalescing onto in-flight producer");
            in_flight.notify.notified().await;
            let result = in_flight
                .result
                .lock()
                .expect("in-flight result lock poisoned")
                .clone();
            return match result {
                Some(Ok(bytes)) => Ok(bytes),
                // The original error type is not `Clone`; waiters observe
                // the same failure as the producer but as a fetch failure
                // rather than the producer's original variant.
                Some(Err(detail)) => Err(LoaderError::FetchFailed {
                    url: None,
                    detail,
                }),
                None => unreachable!("notified before result was set"),
            };
        }

        let outcome = self.produce_and_store(&hash, &hex, producer).await;

        {
            let mut map = self.in_flight.lock().await;
            map.remove(&hex);
        }
        *in_flight
            .result
            .lock()
            .expect("in-flight result lock poisoned") =
            Some(outcome.as_ref().map(Clone::clone).map_err(ToString::to_string));
        in_flight.notify.notify_waiters();

        outcome
    }

    /// Return cached bytes for `hash` if present and `READY`, without
    /// invoking a producer on a miss. Used by collaborators that already
    /// know a content hash out-of-band (e.g. a remembered manifest hash)
    /// and want a read-only lookup.
    pub async fn get_if_ready(&self, hash: Sha256Hex) -> Result<Option<Vec<u8>>, LoaderError> {
        self.try_read_ready(&hash.to_hex()).await
    }

    async fn try_read_ready(&self, hex: &str) -> Result<Option<Vec<u8>>, LoaderError> {
        let index = self.index.clone();
        let hex_owned = hex.to_string();
        let now = now_ms();
        let found = tokio::task::spawn_blocking(move || -> Result<bool, LoaderError> {
            let index = index.blocking_lock();
            match index.get(&hex_owned)? {
                Some(row) if row.state == EntryState::Ready => {
                    index.touch(&hex_owned, now)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
        .await
        .map_err(join_err)??;

        if found {
            Ok(Some(tokio::fs::read(self.blob_path(hex)).await?))
        } else {
            Ok(None)
        }
    }

    async fn produce_and_store<F, Fut>(
        &self,
        hash: &Sha256Hex,
        hex: &str,
        producer: F,
    ) -> Result<Vec<u8>, LoaderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, LoaderError>>,
    {
        let bytes = producer().await?;

        let actual = Sha256Hex::of(&bytes);
        if actual != *hash {
            return Err(LoaderError::ChecksumMismatch {
                id: hex.to_string(),
                expected: hash.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let size = bytes.len() as u64;
        if size > self.capacity {
            return Err(LoaderError::CacheFull {
                size,
                capacity: self.capacity,
            });
        }

        let now = now_ms();
        {
            let index = self.index.clone();
            let hex_owned = hex.to_string();
            tokio::task::spawn_blocking(move || index.blocking_lock().insert_dirty(&hex_owned, size, now))
                .await
                .map_err(join_err)??;
        }

        let dirty_path = self.dirty_path(hex);
        let final_path = self.blob_path(hex);
        {
            let mut file = tokio::fs::File::create(&dirty_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&dirty_path, &final_path).await?;

        {
            let index = self.index.clone();
            let hex_owned = hex.to_string();
            tokio::task::spawn_blocking(move || index.blocking_lock().mark_ready(&hex_owned, now))
                .await
                .map_err(join_err)??;
        }

        self.evict_to_capacity().await?;
        Ok(bytes)
    }

    /// Create or update the pin record for `app_name`, binding it to
    /// `manifest_hash` and `file_hashes` (which must all already be
    /// `READY`). Releases every other pin previously held by `app_name`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::CacheCorrupt`] if any listed hash is absent
    /// or not yet `READY`.
    pub async fn pin(
        &self,
        app_name: &str,
        manifest_hash: &str,
        file_hashes: &[Sha256Hex],
    ) -> Result<(), LoaderError> {
        let index = self.index.clone();
        let app = app_name.to_string();
        let manifest = manifest_hash.to_string();
        let hashes: Vec<String> = file_hashes.iter().map(Sha256Hex::to_hex).collect();
        tokio::task::spawn_blocking(move || -> Result<(), LoaderError> {
            let mut index = index.blocking_lock();
            for h in &hashes {
                match index.get(h)? {
                    Some(row) if row.state == EntryState::Ready => {}
                    Some(_) => {
                        return Err(LoaderError::CacheCorrupt {
                            hash: h.clone(),
                            detail: "pin target is not yet READY".into(),
                        })
                    }
                    None => {
                        return Err(LoaderError::CacheCorrupt {
                            hash: h.clone(),
                            detail: "pin target absent from index".into(),
                        })
                    }
                }
            }
            index.set_pins(&app, &manifest, &hashes)
        })
        .await
        .map_err(join_err)??;

        // Unpinning the app's previous manifest can make old entries
        // evictable, so every pin change re-runs eviction.
        self.evict_to_capacity().await
    }

    /// Remove `app_name`'s pin for `manifest_hash` and run eviction.
    pub async fn unpin(&self, app_name: &str, manifest_hash: &str) -> Result<(), LoaderError> {
        let index = self.index.clone();
        let app = app_name.to_string();
        let manifest = manifest_hash.to_string();
        tokio::task::spawn_blocking(move || index.blocking_lock().clear_pins(&app, &manifest))
            .await
            .map_err(join_err)??;
        self.evict_to_capacity().await
    }

    /// Delete unpinned `READY` entries, oldest-last-used-first, until
    /// total unpinned size is within `capacity - currentPinnedSize`.
    async fn evict_to_capacity(&self) -> Result<(), LoaderError> {
        let index = self.index.clone();
        let root = self.root.clone();
        let capacity = self.capacity;
        tokio::task::spawn_blocking(move || -> Result<(), LoaderError> {
            let index = index.blocking_lock();
            loop {
                let budget = capacity.saturating_sub(index.total_pinned_size()?);
                if index.total_unpinned_size()? <= budget {
                    return Ok(());
                }
                let victims = index.unpinned_ready_by_lru()?;
                let Some(victim) = victims.first() else {
                    return Ok(());
                };
                tracing::debug!(target: "mlx.cache", hash = %victim.hash, size = victim.size, "evicting");
                let _ = std::fs::remove_file(root.join(&victim.hash));
                index.delete(&victim.hash)?;
            }
        })
        .await
        .map_err(join_err)?
    }

    /// Report pinned vs. evictable space for operator dashboards.
    pub async fn space_in_use(&self) -> Result<SpaceInUse, LoaderError> {
        let index = self.index.clone();
        let capacity = self.capacity;
        tokio::task::spawn_blocking(move || -> Result<SpaceInUse, LoaderError> {
            let index = index.blocking_lock();
            let unpinned_bytes = index.total_unpinned_size()?;
            let total_bytes = index.total_ready_size()?;
            Ok(SpaceInUse {
                pinned_bytes: total_bytes.saturating_sub(unpinned_bytes),
                unpinned_bytes,
                capacity_bytes: capacity,
            })
        })
        .await
        .map_err(join_err)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(max_size_bytes: u64) -> CacheConfig {
        CacheConfig { max_size_bytes }
    }

    #[tokio::test]
    async fn get_or_put_stores_and_returns_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path(), &config(1024)).await.unwrap();
        let bytes = b"hello world".to_vec();
        let hash = Sha256Hex::of(&bytes);

        let result = cache
            .get_or_put(hash, || {
                let bytes = bytes.clone();
                async move { Ok(bytes) }
            })
            .await
            .unwrap();
        assert_eq!(result, b"hello world");
    }

    #[tokio::test]
    async fn get_or_put_hit_does_not_invoke_producer() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path(), &config(1024)).await.unwrap();
        let bytes = b"cached".to_vec();
        let hash = Sha256Hex::of(&bytes);

        cache
            .get_or_put(hash, || {
                let bytes = bytes.clone();
                async move { Ok(bytes) }
            })
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result = cache
            .get_or_put(hash, move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Vec::new()) }
            })
            .await
            .unwrap();
        assert_eq!(result, b"cached");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn checksum_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path(), &config(1024)).await.unwrap();
        let claimed_hash = Sha256Hex::of(b"claimed");

        let err = cache
            .get_or_put(claimed_hash, || async { Ok(b"different bytes".to_vec()) })
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn coalesces_concurrent_producers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileCache::open(dir.path(), &config(1024)).await.unwrap());
        let bytes = b"shared".to_vec();
        let hash = Sha256Hex::of(&bytes);
        let calls = Arc::new(AtomicUsize::new(0));

        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let cache = cache.clone();
            let bytes = bytes.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_put(hash, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok(bytes)
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), b"shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pin_requires_ready_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path(), &config(1024)).await.unwrap();
        let ghost = Sha256Hex::of(b"never stored");
        let err = cache.pin("app", "manifest", &[ghost]).await.unwrap_err();
        assert!(matches!(err, LoaderError::CacheCorrupt { .. }));
    }

    #[tokio::test]
    async fn eviction_spares_pinned_entries() {
        let dir = tempfile::tempdir().unwrap();
        // Capacity for a bit more than two 500-byte entries.
        let cache = FileCache::open(dir.path(), &config(1024)).await.unwrap();

        let first = vec![1u8; 500];
        let second = vec![2u8; 500];
        let third = vec![3u8; 500];
        let h1 = Sha256Hex::of(&first);
        let h2 = Sha256Hex::of(&second);
        let h3 = Sha256Hex::of(&third);

        cache.get_or_put(h1, || async move { Ok(first) }).await.unwrap();
        cache.get_or_put(h2, || async move { Ok(second) }).await.unwrap();
        cache.pin("app", "m1", &[h1]).await.unwrap();
        cache.get_or_put(h3, || async move { Ok(third) }).await.unwrap();

        let space = cache.space_in_use().await.unwrap();
        assert!(space.unpinned_bytes <= space.capacity_bytes);
        assert!(cache.try_read_ready(&h1.to_hex()).await.unwrap().is_some());
        assert!(cache.try_read_ready(&h2.to_hex()).await.unwrap().is_none());
        assert!(cache.try_read_ready(&h3.to_hex()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn object_larger_than_capacity_is_rejected_as_cache_full() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path(), &config(10)).await.unwrap();
        let bytes = vec![7u8; 20];
        let hash = Sha256Hex::of(&bytes);

        let err = cache
            .get_or_put(hash, move || async move { Ok(bytes) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoaderError::CacheFull { size: 20, capacity: 10 }
        ));
        assert!(cache.try_read_ready(&hash.to_hex()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reopen_prunes_dirty_rows_left_by_a_killed_process() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = FileCache::open(dir.path(), &config(1024)).await.unwrap();
            let index = cache.index.clone();
            // Simulate a process that created a dirty row and then died
            // before renaming the file into place or marking it ready.
            tokio::task::spawn_blocking(move || {
                index.blocking_lock().insert_dirty("abandoned", 5, 1)
            })
            .await
            .unwrap()
            .unwrap();
        }

        let reopened = FileCache::open(dir.path(), &config(1024)).await.unwrap();
        let index = reopened.index.clone();
        let row = tokio::task::spawn_blocking(move || index.blocking_lock().get("abandoned"))
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_none(), "dirty row from a dead process should be pruned on reopen");
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration-level property tests for the content-addressed cache.

use mlx_core::{CacheConfig, Sha256Hex};
use mlx_cache::FileCache;
use proptest::prelude::*;

/// P10: after any cache operation, total size of unpinned `READY` files
/// never exceeds `maxSizeInBytes`.
#[test]
fn p10_size_bound_holds_after_random_insert_sequence() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    proptest!(ProptestConfig::with_cases(20), |(sizes in proptest::collection::vec(50usize..300, 1..12))| {
        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let cache = FileCache::open(dir.path(), &CacheConfig { max_size_bytes: 512 })
                .await
                .unwrap();

            for (i, size) in sizes.iter().enumerate() {
                let bytes = vec![(i % 251) as u8; *size];
                let hash = Sha256Hex::of(&bytes);
                cache.get_or_put(hash, || async move { Ok(bytes) }).await.unwrap();
            }

            let space = cache.space_in_use().await.unwrap();
            prop_assert!(space.unpinned_bytes <= space.capacity_bytes);
            Ok(())
        })?;
    });
}

/// P9: a pinned entry is never deleted by eviction, no matter how much
/// unpinned traffic follows it.
#[tokio::test]
async fn p9_pinned_entry_survives_eviction_pressure() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::open(dir.path(), &CacheConfig { max_size_bytes: 300 })
        .await
        .unwrap();

    let pinned_bytes = vec![9u8; 200];
    let pinned_hash = Sha256Hex::of(&pinned_bytes);
    cache
        .get_or_put(pinned_hash, || async move { Ok(pinned_bytes) })
        .await
        .unwrap();
    cache.pin("app", "manifest-1", &[pinned_hash]).await.unwrap();

    for i in 0..5u8 {
        let bytes = vec![i; 200];
        let hash = Sha256Hex::of(&bytes);
        let _ = cache.get_or_put(hash, || async move { Ok(bytes) }).await;
    }

    let space = cache.space_in_use().await.unwrap();
    assert!(space.pinned_bytes >= 200);
}
